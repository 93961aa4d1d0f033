//! Error and warning accumulation for one load or merge operation.
//!
//! Readers and validators never return per-row failures; they append them
//! here and keep going. Callers inspect the recorder once the operation is
//! done, or use a fail-fast recorder to stop at the first problem.

use std::{collections::HashSet, fmt};

use log::debug;

use crate::error::MessageRecorderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
    pub dedup_key: Option<String>,
}

impl Message {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            text: text.into(),
            dedup_key: None,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            text: text.into(),
            dedup_key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.text)
    }
}

pub type MessageFormatter = Box<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Default)]
pub struct MessageRecorder {
    errors: Vec<Message>,
    warnings: Vec<Message>,
    error_keys: HashSet<String>,
    warning_keys: HashSet<String>,
    formatter: Option<MessageFormatter>,
    ignore_errors: bool,
    ignore_warnings: bool,
    fail_fast: bool,
}

impl fmt::Debug for MessageRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRecorder")
            .field("errors", &self.errors)
            .field("warnings", &self.warnings)
            .field("ignore_errors", &self.ignore_errors)
            .field("ignore_warnings", &self.ignore_warnings)
            .field("fail_fast", &self.fail_fast)
            .finish_non_exhaustive()
    }
}

impl MessageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warnings are still collected but no longer count against [`is_success`](Self::is_success).
    pub fn ignore_warnings() -> Self {
        Self {
            ignore_warnings: true,
            ..Self::default()
        }
    }

    /// Ignoring errors implies ignoring warnings.
    pub fn ignore_errors() -> Self {
        Self {
            ignore_errors: true,
            ignore_warnings: true,
            ..Self::default()
        }
    }

    /// Trips on the first message that makes the recorder unsuccessful; readers
    /// sharing it stop producing rows from then on.
    pub fn fail_fast() -> Self {
        Self {
            fail_fast: true,
            ..Self::default()
        }
    }

    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.formatter = Some(Box::new(formatter));
        self
    }

    pub fn append_error(&mut self, text: impl Into<String>) {
        self.record(Message::error(text));
    }

    pub fn append_distinct_error(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.record(Message::error(text).with_key(key));
    }

    pub fn append_warning(&mut self, text: impl Into<String>) {
        self.record(Message::warning(text));
    }

    pub fn append_distinct_warning(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.record(Message::warning(text).with_key(key));
    }

    /// Messages carrying a dedup key are dropped when that key was already
    /// recorded for the same severity.
    pub fn record(&mut self, mut message: Message) {
        if let Some(key) = &message.dedup_key {
            let seen = match message.severity {
                Severity::Error => &mut self.error_keys,
                Severity::Warning => &mut self.warning_keys,
            };
            if !seen.insert(key.clone()) {
                return;
            }
        }
        if let Some(formatter) = &self.formatter {
            message.text = formatter(&message.text);
        }
        debug!("Recorded {message}");
        match message.severity {
            Severity::Error => self.errors.push(message),
            Severity::Warning => self.warnings.push(message),
        }
    }

    pub fn errors(&self) -> &[Message] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Message] {
        &self.warnings
    }

    pub fn error_texts(&self) -> Vec<&str> {
        self.errors.iter().map(|m| m.text.as_str()).collect()
    }

    pub fn warning_texts(&self) -> Vec<&str> {
        self.warnings.iter().map(|m| m.text.as_str()).collect()
    }

    pub fn is_success(&self) -> bool {
        (self.ignore_errors || self.errors.is_empty())
            && (self.ignore_warnings || self.warnings.is_empty())
    }

    pub fn is_fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn is_halted(&self) -> bool {
        self.fail_fast && !self.is_success()
    }

    /// Returns the first blocking message as an error once a fail-fast recorder tripped.
    pub fn check(&self) -> Result<(), MessageRecorderError> {
        if !self.is_halted() {
            return Ok(());
        }
        let blocking_error = self.errors.first().filter(|_| !self.ignore_errors);
        let first = blocking_error.or_else(|| self.warnings.first());
        Err(MessageRecorderError(
            first.map(|m| m.text.clone()).unwrap_or_default(),
        ))
    }

    pub fn contains_error(&self, text: &str) -> bool {
        self.errors.iter().any(|m| m.text == text)
    }

    /// Removes repeated texts, keeping the first occurrence of each.
    pub fn distinct_messages(&mut self) {
        distinct_by_text(&mut self.errors);
        distinct_by_text(&mut self.warnings);
    }

    /// Clears recorded messages; dedup keys are kept.
    pub fn reset(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }
}

fn distinct_by_text(messages: &mut Vec<Message>) {
    let mut seen = HashSet::new();
    messages.retain(|m| seen.insert(m.text.clone()));
}
