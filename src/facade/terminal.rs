use std::io::BufRead;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{Error, Result};

/// Where interactive loops read user input from.
pub trait LineSource {
    /// The next line without its trailing newline, or `None` once input ends.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;

    /// Whether the prompt and typed text are already visible on screen.
    fn echoes_input(&self) -> bool {
        false
    }
}

/// Line editor on an interactive terminal. Ctrl-C and Ctrl-D end input.
pub struct TerminalInput {
    editor: DefaultEditor,
}

impl TerminalInput {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().map_err(readline_error)?;
        Ok(Self { editor })
    }
}

impl LineSource for TerminalInput {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                        tracing::debug!("failed to record line history: {}", e);
                    }
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(readline_error(e)),
        }
    }

    fn echoes_input(&self) -> bool {
        true
    }
}

fn readline_error(e: ReadlineError) -> Error {
    Error::io("<terminal>", std::io::Error::other(e))
}

/// Reads lines from any buffered reader, e.g. piped stdin or a test script.
pub struct ScriptedInput<R> {
    reader: R,
}

impl<R: BufRead> ScriptedInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for ScriptedInput<R> {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| Error::io("<input>", e))?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    Clear,
    History,
    Help,
}

impl ChatCommand {
    /// `Some` if `line` starts with a known slash command. Anything else,
    /// including unknown `/words`, is ordinary user text.
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim().strip_prefix('/')?.split_whitespace().next()?;
        match word {
            "exit" | "quit" | "bye" => Some(Self::Exit),
            "clear" | "reset" => Some(Self::Clear),
            "history" => Some(Self::History),
            "help" | "?" => Some(Self::Help),
            _ => None,
        }
    }
}

pub const HELP: &str = "\
Commands:
  /exit, /quit   Leave the chat
  /clear         Forget the conversation so far
  /history       Show the retained conversation
  /help          Show this help";
