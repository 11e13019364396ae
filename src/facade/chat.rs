use std::io::Write;

use super::terminal::{ChatCommand, LineSource, HELP};
use super::{echo_input, extend_history, LlmModel, WebDemoReply, WebDemoStream, USER_PROMPT};
use crate::core::generation::{ChatGenerator, Dialog, GenerationParams, History, Llama2Generator, Message};
use crate::core::model::ModelVariant;
use crate::error::{Error, Result};

pub const CHAT_PARAMS: GenerationParams = GenerationParams::new(128, 0.6, 0.9);

/// Dialog-style facade over a LLaMA-2 chat model.
pub struct Llama2Model<G = Llama2Generator> {
    generator: G,
    system_prompt: Option<String>,
}

impl<G: ChatGenerator> Llama2Model<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            system_prompt: None,
        }
    }

    /// Prepends a system message to every dialog sent to the model.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    fn new_dialog(&self) -> Dialog {
        let mut dialog = Dialog::new();
        if let Some(system) = &self.system_prompt {
            dialog.push(Message::system(system.clone()));
        }
        dialog
    }

    /// Fits `dialog` into the prompt budget and returns the assistant's answer.
    fn complete(&self, dialog: &mut Dialog) -> Result<String> {
        let budget = self
            .generator
            .max_seq_len()
            .saturating_sub(CHAT_PARAMS.max_gen_len);
        dialog.fit_window(budget, |d| self.generator.dialog_tokens(d))?;

        let prediction = self
            .generator
            .chat_completion(std::slice::from_ref(dialog), &CHAT_PARAMS)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidRequest("chat completion returned no prediction".into()))?;
        Ok(prediction.generation.content)
    }
}

impl<G: ChatGenerator> LlmModel for Llama2Model<G> {
    fn variant(&self) -> ModelVariant {
        ModelVariant::Llama2
    }

    fn run(&self, text: &str) -> Result<String> {
        let mut dialog = self.new_dialog();
        dialog.push(Message::user(text));
        self.complete(&mut dialog)
    }

    fn chat(&self, input: &mut dyn LineSource, output: &mut dyn Write) -> Result<()> {
        let io = |e: std::io::Error| Error::io("<output>", e);
        let mut dialog = self.new_dialog();

        while let Some(line) = input.read_line(USER_PROMPT)? {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            echo_input(&*input, output, text)?;

            match ChatCommand::parse(text) {
                Some(ChatCommand::Exit) => break,
                Some(ChatCommand::Clear) => {
                    dialog = self.new_dialog();
                    write!(output, "\x1B[2J\x1B[1;1H").map_err(io)?;
                    continue;
                }
                Some(ChatCommand::History) => {
                    for message in dialog.messages() {
                        writeln!(output, "{}: {}", message.role, message.content).map_err(io)?;
                    }
                    continue;
                }
                Some(ChatCommand::Help) => {
                    writeln!(output, "{}", HELP).map_err(io)?;
                    continue;
                }
                None => {}
            }

            dialog.push(Message::user(text));
            let content = self.complete(&mut dialog)?;
            writeln!(output, "Assistant: {}", content).map_err(io)?;
            output.flush().map_err(io)?;
            dialog.push(Message::assistant(content));
        }

        Ok(())
    }

    fn run_web_demo<'a>(&'a self, text: &str, history: &History) -> WebDemoStream<'a> {
        let text = text.to_string();
        let history = history.clone();
        Box::new(std::iter::once_with(move || {
            let mut dialog = self.new_dialog();
            for message in Dialog::from_history(&history).messages() {
                dialog.push(message.clone());
            }
            dialog.push(Message::user(text.clone()));

            let response = self.complete(&mut dialog)?;
            let history = extend_history(&history, text, &response);
            Ok(WebDemoReply { response, history })
        }))
    }
}
