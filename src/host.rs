//! Host messaging capability
//!
//! The chat front end (or the console binary) implements [`Host`]; the
//! interpreter only ever talks to the user through it.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Timed out after {seconds}s waiting for input")]
    Timeout { seconds: u64 },

    #[error("The host does not support {0}")]
    Unsupported(&'static str),

    #[error("Failed to send reply: {0}")]
    Send(String),

    #[error("Failed to read input: {0}")]
    Input(String),
}

/// A file sent with a reply or received with the triggering message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[async_trait]
pub trait Host: Send + Sync {
    async fn reply(&self, reply: Reply) -> Result<(), HostError>;

    /// Show `prompt` and wait for the next input, at most `timeout`
    async fn prompt_for_input(&self, prompt: &str, timeout: Duration)
        -> Result<String, HostError>;

    /// Files attached to the message that triggered the run
    fn attachments(&self) -> Vec<Attachment> {
        Vec::new()
    }

    /// Evaluate a code body in the host's environment
    async fn evaluate(&self, _body: &str) -> Result<String, HostError> {
        Err(HostError::Unsupported("code evaluation"))
    }

    /// Signal a fully successful run
    async fn acknowledge(&self) -> Result<(), HostError> {
        Ok(())
    }
}
