use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;

/// Stops a running [`GenerationStream`] from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Re-arms the handle for the next stream.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Lazily produced generation output.
///
/// Every item is the full text generated so far, so each element extends the
/// previous one. The stream ends when the model emits end-of-sequence, the
/// length budget runs out, a step fails, or the stream is cancelled.
pub struct GenerationStream<'a> {
    inner: Box<dyn Iterator<Item = Result<String>> + Send + 'a>,
    cancel: CancelHandle,
    done: bool,
}

impl<'a> GenerationStream<'a> {
    pub fn new<I>(inner: I) -> Self
    where
        I: Iterator<Item = Result<String>> + Send + 'a,
    {
        Self {
            inner: Box::new(inner),
            cancel: CancelHandle::new(),
            done: false,
        }
    }

    /// Shares an existing handle instead of the stream's own.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drains the stream and returns its last element, or an empty string if
    /// nothing was produced. The first error ends the drain.
    pub fn into_final(self) -> Result<String> {
        let mut last = String::new();
        for item in self {
            last = item?;
        }
        Ok(last)
    }
}

impl Iterator for GenerationStream<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cancel.is_cancelled() {
            return None;
        }
        let item = self.inner.next();
        match &item {
            None | Some(Err(_)) => self.done = true,
            Some(Ok(_)) => {}
        }
        item
    }
}

/// The part of `next` not yet shown, if `next` extends `shown` cleanly.
///
/// Returns `None` while the tail holds an incomplete UTF-8 sequence (decoded
/// as U+FFFD) or when the text was rewritten instead of extended.
pub fn printable_delta<'s>(shown: &str, next: &'s str) -> Option<&'s str> {
    if next.ends_with('\u{FFFD}') {
        return None;
    }
    next.strip_prefix(shown)
}
