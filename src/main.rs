use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use llama_chat::cmd;
use llama_chat::config::ModelSettings;
use llama_chat::core::runtime::{DevicePreference, Precision};

#[derive(Parser)]
#[command(name = "llama-chat")]
#[command(version)]
#[command(about = "Chat with Meta LLaMA and LLaMA-2 checkpoints", long_about = None)]
struct Cli {
    /// YAML settings file; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// `llama` for completion, `llama2` for chat.
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[arg(long, global = true)]
    ckpt_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    tokenizer_path: Option<PathBuf>,

    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// auto, cpu, cuda or metal.
    #[arg(long, global = true)]
    device: Option<DevicePreference>,

    /// f16, bf16 or f32.
    #[arg(long, global = true)]
    dtype: Option<Precision>,

    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one prompt.
    Run {
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
    },
    /// Interactive chat in the terminal.
    Chat,
    /// Serve the web demo API.
    Serve {
        /// host:port to bind; defaults to LLAMA_CHAT_HOST.
        #[arg(long)]
        host: Option<String>,
    },
    /// Show the checkpoint and model arguments that would be loaded.
    Inspect,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<ModelSettings> {
        let mut settings = match &self.config {
            Some(path) => ModelSettings::from_yaml_file(path)?,
            None => ModelSettings::default(),
        };
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(dir) = &self.ckpt_dir {
            settings.ckpt_dir = Some(dir.clone());
        }
        if let Some(path) = &self.tokenizer_path {
            settings.tokenizer_path = Some(path.clone());
        }
        if let Some(dir) = &self.cache_dir {
            settings.cache_dir = dir.clone();
        }
        if let Some(device) = self.device {
            settings.runtime.device = device;
        }
        if let Some(precision) = self.dtype {
            settings.runtime.precision = precision;
        }
        if let Some(seed) = self.seed {
            settings.runtime.seed = seed;
        }
        Ok(settings)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.settings() {
        Ok(settings) => match cli.command {
            Commands::Run { prompt } => cmd::run(settings, prompt).await,
            Commands::Chat => cmd::chat(settings).await,
            Commands::Serve { host } => cmd::serve(settings, host).await,
            Commands::Inspect => cmd::inspect(settings).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
