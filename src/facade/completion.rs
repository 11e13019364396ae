use std::collections::VecDeque;
use std::io::Write;

use super::terminal::{ChatCommand, LineSource, HELP};
use super::{echo_input, extend_history, LlmModel, WebDemoReply, WebDemoStream, USER_PROMPT};
use crate::core::generation::{
    printable_delta, CancelHandle, GenerationParams, GenerationStream, Generator, History, LlamaGenerator,
};
use crate::core::model::ModelVariant;
use crate::error::{Error, Result};

pub const RUN_PARAMS: GenerationParams = GenerationParams::new(256, 0.8, 0.95);

const SPEAKER: &str = "LLaMA   : ";
const DEFAULT_TRANSCRIPT_WINDOW: usize = 32;

/// Completion-style facade: every input is answered on its own.
pub struct LlamaModel<G = LlamaGenerator> {
    generator: G,
    transcript_window: usize,
    interrupt: CancelHandle,
}

impl<G: Generator> LlamaModel<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            transcript_window: DEFAULT_TRANSCRIPT_WINDOW,
            interrupt: CancelHandle::new(),
        }
    }

    /// How many exchanges the chat transcript retains.
    pub fn with_transcript_window(mut self, turns: usize) -> Self {
        self.transcript_window = turns.max(1);
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Incremental output for `text`; each item extends the previous one.
    pub fn stream(&self, text: &str) -> Result<GenerationStream<'_>> {
        self.generator.generate(text, &RUN_PARAMS)
    }

    fn answer_streaming(&self, text: &str, output: &mut dyn Write) -> Result<String> {
        let io = |e: std::io::Error| Error::io("<output>", e);

        self.interrupt.reset();
        let stream = self.stream(text)?.with_cancel(self.interrupt.clone());

        write!(output, "{}", SPEAKER).map_err(io)?;
        let mut shown = String::new();
        let mut last = String::new();
        for partial in stream {
            last = partial?;
            if let Some(delta) = printable_delta(&shown, &last) {
                write!(output, "{}", delta).map_err(io)?;
                output.flush().map_err(io)?;
                shown.clone_from(&last);
            }
        }
        if shown != last {
            match last.strip_prefix(shown.as_str()) {
                Some(rest) => write!(output, "{}", rest).map_err(io)?,
                None => write!(output, "\n{}{}", SPEAKER, last).map_err(io)?,
            }
        }
        writeln!(output).map_err(io)?;
        if self.interrupt.is_cancelled() {
            tracing::debug!(chars = last.chars().count(), "answer interrupted");
        }
        Ok(last)
    }
}

impl<G: Generator> LlmModel for LlamaModel<G> {
    fn variant(&self) -> ModelVariant {
        ModelVariant::Llama
    }

    fn run(&self, text: &str) -> Result<String> {
        self.stream(text)?.into_final()
    }

    fn chat(&self, input: &mut dyn LineSource, output: &mut dyn Write) -> Result<()> {
        let io = |e: std::io::Error| Error::io("<output>", e);
        let mut transcript: VecDeque<(String, String)> = VecDeque::new();

        while let Some(line) = input.read_line(USER_PROMPT)? {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            echo_input(&*input, output, text)?;

            match ChatCommand::parse(text) {
                Some(ChatCommand::Exit) => break,
                Some(ChatCommand::Clear) => {
                    transcript.clear();
                    write!(output, "\x1B[2J\x1B[1;1H").map_err(io)?;
                    continue;
                }
                Some(ChatCommand::History) => {
                    for (prompt, response) in &transcript {
                        writeln!(output, "{}{}\n{}{}", USER_PROMPT, prompt, SPEAKER, response).map_err(io)?;
                    }
                    continue;
                }
                Some(ChatCommand::Help) => {
                    writeln!(output, "{}", HELP).map_err(io)?;
                    continue;
                }
                None => {}
            }

            let response = self.answer_streaming(text, output)?;
            transcript.push_back((text.to_string(), response));
            while transcript.len() > self.transcript_window {
                transcript.pop_front();
            }
        }

        Ok(())
    }

    fn run_web_demo<'a>(&'a self, text: &str, history: &History) -> WebDemoStream<'a> {
        let text = text.to_string();
        let history = history.clone();
        Box::new(std::iter::once_with(move || {
            let response = self.run(&text)?;
            let history = extend_history(&history, text, &response);
            Ok(WebDemoReply { response, history })
        }))
    }

    fn interrupt_handle(&self) -> Option<CancelHandle> {
        Some(self.interrupt.clone())
    }
}
