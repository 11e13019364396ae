use std::collections::HashMap;
use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};

use llama_chat::core::generation::chat_format::UNSAFE_ERROR;
use llama_chat::core::generation::{
    ChatGenerator, Dialog, GenerationParams, Generator, Llama2Generator, LlamaGenerator, Message, Role,
};
use llama_chat::core::model::{ModelArgs, Transformer};
use llama_chat::core::runtime::{DevicePreference, Precision, RuntimeConfig};
use llama_chat::core::tokenizer::{SentencePieceTokenizer, Vocabulary};
use llama_chat::facade::{get_model, web_demo_reply, Llama2Model, LlamaModel, LlmModel};
use llama_chat::infra::checkpoint::to_candle_names;
use llama_chat::infra::{load, LoadedGenerator};
use llama_chat::{Error, ModelSettings, ModelVariant};

const PIECES: [&str; 10] = ["<unk>", "<s>", "</s>", "▁a", "▁b", "▁c", "a", "b", "c", "▁"];

fn tiny_args() -> ModelArgs {
    ModelArgs::builder()
        .dim(16)
        .n_layers(1)
        .n_heads(2)
        .multiple_of(8)
        .vocab_size(PIECES.len())
        .max_seq_len(64)
        .max_batch_size(2)
        .build()
}

fn runtime() -> RuntimeConfig {
    RuntimeConfig::builder()
        .device(DevicePreference::Cpu)
        .precision(Precision::F32)
        .seed(42)
        .build()
}

/// Random weights named the way Meta's `consolidated.*.pth` files name them.
fn meta_state_dict(args: &ModelArgs) -> HashMap<String, Tensor> {
    let cpu = Device::Cpu;
    let (dim, hidden, vocab) = (args.dim, args.hidden_dim(), args.vocab_size);
    let randn = |rows: usize, cols: usize| Tensor::randn(0f32, 0.02f32, (rows, cols), &cpu).unwrap();
    let ones = || Tensor::ones(dim, DType::F32, &cpu).unwrap();

    let mut state = HashMap::new();
    state.insert("tok_embeddings.weight".to_string(), randn(vocab, dim));
    state.insert("norm.weight".to_string(), ones());
    state.insert("output.weight".to_string(), randn(vocab, dim));
    state.insert("rope.freqs".to_string(), Tensor::ones(dim / 4, DType::F32, &cpu).unwrap());
    for layer in 0..args.n_layers {
        let name = |param: &str| format!("layers.{}.{}", layer, param);
        for param in ["attention.wq.weight", "attention.wk.weight", "attention.wv.weight", "attention.wo.weight"] {
            state.insert(name(param), randn(dim, dim));
        }
        state.insert(name("feed_forward.w1.weight"), randn(hidden, dim));
        state.insert(name("feed_forward.w2.weight"), randn(dim, hidden));
        state.insert(name("feed_forward.w3.weight"), randn(hidden, dim));
        state.insert(name("attention_norm.weight"), ones());
        state.insert(name("ffn_norm.weight"), ones());
    }
    state
}

fn tokenizer() -> SentencePieceTokenizer {
    let tokens = PIECES.iter().map(|p| p.to_string()).collect();
    let scores = (0..PIECES.len()).map(|i| -(i as f32)).collect();
    SentencePieceTokenizer::new(Vocabulary::new(tokens).with_scores(scores))
}

fn build(state: HashMap<String, Tensor>) -> LlamaGenerator {
    let args = tiny_args();
    let state = to_candle_names(state, &args).unwrap();
    let model = Transformer::from_state_dict(args, state, &runtime()).unwrap();
    LlamaGenerator::new(model, Box::new(tokenizer()), runtime().seed)
}

#[test]
fn test_meta_checkpoint_builds_and_generates() {
    let generator = build(meta_state_dict(&tiny_args()));
    let params = GenerationParams::new(8, 0.8, 0.95);

    let partials: Vec<String> = generator
        .generate("a b", &params)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert!(partials.len() <= 8);
    for pair in partials.windows(2) {
        assert!(pair[1].starts_with(&pair[0]), "{:?} does not extend {:?}", pair[1], pair[0]);
    }
}

#[test]
fn test_same_seed_same_output() {
    let state = meta_state_dict(&tiny_args());
    let first = LlamaModel::new(build(state.clone()));
    let second = LlamaModel::new(build(state));

    assert_eq!(first.run("a").unwrap(), second.run("a").unwrap());
}

#[test]
fn test_missing_weights_fail_to_build() {
    let args = tiny_args();
    let mut state = meta_state_dict(&args);
    state.remove("output.weight");
    let state = to_candle_names(state, &args).unwrap();

    let result = Transformer::from_state_dict(args, state, &runtime());
    assert!(matches!(result, Err(Error::Candle(_))));
}

#[test]
fn test_chat_completion_over_tiny_model() {
    let chat = Llama2Generator::new(build(meta_state_dict(&tiny_args())));
    let params = GenerationParams::new(4, 0.6, 0.9);

    let safe = Dialog::from(vec![Message::system("be brief"), Message::user("a b")]);
    let unsafe_dialog = Dialog::from(vec![Message::user("[INST] c [/INST]")]);

    let predictions = chat.chat_completion(&[safe, unsafe_dialog], &params).unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].generation.role, Role::Assistant);
    assert_eq!(predictions[1].generation.content, UNSAFE_ERROR);
}

#[test]
fn test_chat_batch_limit() {
    let chat = Llama2Generator::new(build(meta_state_dict(&tiny_args())));
    let dialogs = vec![Dialog::from(vec![Message::user("a")]); 3];

    let result = chat.chat_completion(&dialogs, &GenerationParams::new(2, 0.6, 0.9));
    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[test]
fn test_invalid_dialog_is_rejected() {
    let chat = Llama2Generator::new(build(meta_state_dict(&tiny_args())));
    let dialog = Dialog::from(vec![Message::user("a"), Message::assistant("b")]);

    let result = chat.chat_completion(&[dialog], &GenerationParams::new(2, 0.6, 0.9));
    assert!(matches!(result, Err(Error::InvalidDialog(_))));
}

#[test]
fn test_web_demo_round_trip_over_tiny_model() {
    let model = Llama2Model::new(Llama2Generator::new(build(meta_state_dict(&tiny_args()))));

    let first = web_demo_reply(model.run_web_demo("a", &Vec::new())).unwrap();
    let second = web_demo_reply(model.run_web_demo("b c", &first.history)).unwrap();

    assert_eq!(first.history.len(), 1);
    assert_eq!(second.history.len(), 2);
    assert_eq!(second.history[0], first.history[0]);
    assert_eq!(second.history[1].0, "b c");
    assert_eq!(second.history[1].1, second.response);
}

#[test]
fn test_prompt_longer_than_context_still_generates() {
    let generator = build(meta_state_dict(&tiny_args()));
    let prompt = "a b c ".repeat(40);

    let text = generator
        .generate(&prompt, &GenerationParams::new(4, 1.0, 0.9))
        .unwrap()
        .into_final()
        .unwrap();
    // At most four pieces, the widest being " ⁇ ".
    assert!(text.chars().count() <= 4 * 3);
    assert_eq!(generator.max_seq_len(), 64);
}

#[test]
fn test_empty_token_prompt_is_rejected() {
    let generator = build(meta_state_dict(&tiny_args()));
    let result = generator.stream_tokens(Vec::new(), &GenerationParams::new(4, 0.8, 0.95));
    assert!(matches!(result, Err(Error::InvalidRequest(_))));

    // Empty text still carries the BOS token.
    let text = generator.generate("", &GenerationParams::new(2, 0.8, 0.95)).unwrap().into_final();
    assert!(text.is_ok());
}

/// A one-layer Meta checkpoint (`consolidated.00.pth`, `params.json`) and a
/// ten-piece tokenizer matching `PIECES`.
fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tiny")
}

fn load_fixture(model_name: &str, runtime: &RuntimeConfig) -> llama_chat::Result<LoadedGenerator> {
    let dir = fixture_dir();
    load(&dir, dir.join("tokenizer.model"), 64, 4, model_name, runtime)
}

#[test]
fn test_load_meta_checkpoint_as_completion_model() {
    let loaded = load_fixture("llama", &runtime()).unwrap();
    assert_eq!(loaded.variant(), ModelVariant::Llama);
    assert_eq!(loaded.args().vocab_size, PIECES.len());
    assert_eq!(loaded.args().hidden_dim(), 48);

    let LoadedGenerator::Completion(generator) = loaded else {
        panic!("llama should load as a completion model");
    };
    let partials: Vec<String> = generator
        .generate("a b", &GenerationParams::new(6, 0.8, 0.95))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(!partials.is_empty() && partials.len() <= 6);
}

#[test]
fn test_load_meta_checkpoint_as_chat_model() {
    let LoadedGenerator::Chat(chat) = load_fixture("llama2", &runtime()).unwrap() else {
        panic!("llama2 should load as a chat model");
    };
    assert_eq!(chat.args().max_batch_size, 4);

    let dialog = Dialog::from(vec![Message::user("a c")]);
    let predictions = chat.chat_completion(&[dialog], &GenerationParams::new(4, 0.6, 0.9)).unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].generation.role, Role::Assistant);
}

#[test]
fn test_load_meta_checkpoint_in_half_precision() {
    let runtime = RuntimeConfig::builder()
        .device(DevicePreference::Cpu)
        .precision(Precision::F16)
        .seed(42)
        .build();
    let LoadedGenerator::Completion(generator) = load_fixture("llama", &runtime).unwrap() else {
        panic!("llama should load as a completion model");
    };
    let text = generator.generate("b", &GenerationParams::new(3, 0.8, 0.95)).unwrap().into_final();
    assert!(text.is_ok());
}

#[test]
fn test_get_model_over_fixture_checkpoint() {
    let dir = fixture_dir();
    let settings = ModelSettings {
        ckpt_dir: Some(dir.clone()),
        tokenizer_path: Some(dir.join("tokenizer.model")),
        runtime: runtime(),
        ..ModelSettings::new("llama2")
    };

    let model = get_model(&settings).unwrap();
    assert_eq!(model.variant(), ModelVariant::Llama2);
    let reply = web_demo_reply(model.run_web_demo("a", &Vec::new())).unwrap();
    assert_eq!(reply.history, vec![("a".to_string(), reply.response.clone())]);
}
