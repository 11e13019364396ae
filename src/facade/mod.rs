//! User-facing model wrappers: one-shot runs, terminal chat and web-demo steps.

pub mod chat;
pub mod completion;
pub mod factory;
pub mod terminal;

pub use chat::Llama2Model;
pub use completion::LlamaModel;
pub use factory::{get_model, MAX_BATCH_SIZE, MAX_SEQ_LEN};
pub use terminal::{ChatCommand, LineSource, ScriptedInput, TerminalInput};

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::core::generation::{CancelHandle, History};
use crate::core::model::ModelVariant;
use crate::error::{Error, Result};

/// Prompt shown before each line of user input.
pub const USER_PROMPT: &str = "用户输入: ";

/// One web-demo step: the new answer and the history including it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDemoReply {
    pub response: String,
    pub history: History,
}

/// Produces a single [`WebDemoReply`], computed when first polled.
pub type WebDemoStream<'a> = Box<dyn Iterator<Item = Result<WebDemoReply>> + 'a>;

pub trait LlmModel: Send {
    fn variant(&self) -> ModelVariant;

    /// Answers one prompt and returns the full response.
    fn run(&self, text: &str) -> Result<String>;

    /// Interactive loop until `input` runs out or the user exits.
    fn chat(&self, input: &mut dyn LineSource, output: &mut dyn Write) -> Result<()>;

    /// Answers `text` in the context of `history`. The caller's history is
    /// left untouched; the reply carries the extended copy.
    fn run_web_demo<'a>(&'a self, text: &str, history: &History) -> WebDemoStream<'a>;

    /// Stops the answer `chat` is currently streaming, if the model streams.
    fn interrupt_handle(&self) -> Option<CancelHandle> {
        None
    }
}

/// Drains a web-demo stream to its single reply.
pub fn web_demo_reply(mut stream: WebDemoStream<'_>) -> Result<WebDemoReply> {
    stream.next().unwrap_or_else(|| {
        Err(Error::InvalidRequest(
            "web demo produced no reply".into(),
        ))
    })
}

/// Keeps the user's side of the transcript on `output` when `input` does not
/// already show it, e.g. for piped stdin.
fn echo_input(input: &dyn LineSource, output: &mut dyn Write, text: &str) -> Result<()> {
    if !input.echoes_input() {
        writeln!(output, "{}{}", USER_PROMPT, text).map_err(|e| Error::io("<output>", e))?;
    }
    Ok(())
}

fn extend_history(history: &History, text: String, response: &str) -> History {
    let mut next = Vec::with_capacity(history.len() + 1);
    next.extend(history.iter().cloned());
    next.push((text, response.to_string()));
    next
}
