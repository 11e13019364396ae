//! LLaMA-2 chat prompt layout.

use super::dialog::{Dialog, Message, Role};
use crate::core::tokenizer::{EncodeOptions, TokenId, Tokenizer};
use crate::error::{Error, Result};

pub const B_INST: &str = "[INST]";
pub const E_INST: &str = "[/INST]";
pub const B_SYS: &str = "<<SYS>>\n";
pub const E_SYS: &str = "\n<</SYS>>\n\n";

const SPECIAL_TAGS: [&str; 4] = [B_INST, E_INST, "<<SYS>>", "<</SYS>>"];

pub const UNSAFE_ERROR: &str = "Error: special tags are not allowed as part of the prompt.";

/// True if any message smuggles in the prompt delimiters.
pub fn has_special_tags(dialog: &Dialog) -> bool {
    dialog
        .messages()
        .iter()
        .any(|m| SPECIAL_TAGS.iter().any(|tag| m.content.contains(tag)))
}

/// Folds a leading system message into the first user turn and checks that
/// turns alternate user/assistant and end with a user turn.
fn normalize(dialog: &Dialog) -> Result<Vec<Message>> {
    let mut messages = dialog.messages().to_vec();

    if messages.first().map(|m| m.role) == Some(Role::System) {
        let system = messages.remove(0);
        let first = messages
            .first_mut()
            .ok_or_else(|| Error::InvalidDialog("system message without a following turn".into()))?;
        first.content = format!("{}{}{}{}", B_SYS, system.content, E_SYS, first.content);
    }

    for (i, message) in messages.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        if message.role != expected {
            return Err(Error::InvalidDialog(format!(
                "turn {} has role `{}`, expected `{}`",
                i, message.role, expected
            )));
        }
    }

    match messages.last() {
        Some(m) if m.role == Role::User => Ok(messages),
        Some(_) => Err(Error::InvalidDialog("last turn must come from the user".into())),
        None => Err(Error::InvalidDialog("dialog is empty".into())),
    }
}

/// Token ids of the whole dialog laid out for the chat model.
pub fn dialog_prompt_tokens(tokenizer: &dyn Tokenizer, dialog: &Dialog) -> Result<Vec<TokenId>> {
    let messages = normalize(dialog)?;
    let (last, pairs) = messages
        .split_last()
        .ok_or_else(|| Error::InvalidDialog("dialog is empty".into()))?;

    let mut tokens = Vec::new();
    for pair in pairs.chunks(2) {
        let text = format!(
            "{} {} {} {} ",
            B_INST,
            pair[0].content.trim(),
            E_INST,
            pair[1].content.trim()
        );
        tokens.extend(tokenizer.encode_with_options(&text, &EncodeOptions::new().with_bos().with_eos()));
    }

    let text = format!("{} {} {}", B_INST, last.content.trim(), E_INST);
    tokens.extend(tokenizer.encode_with_options(&text, &EncodeOptions::new().with_bos()));
    Ok(tokens)
}
