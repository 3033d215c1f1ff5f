//! Cloud reasoning and speech synthesis.
//!
//! Two async collaborator traits sit at the seam between the threaded core
//! and the network:
//!
//! * [`ReasoningService`]: utterance (+ optional image) → optional text and
//!   zero-or-more function calls.
//! * [`SpeechSynthesizer`]: text → mono 16-bit PCM.
//!
//! [`GeminiClient`] implements both over HTTPS.  The workers in [`worker`]
//! drive them from plain threads, one current-thread tokio runtime each.

pub mod declarations;
pub mod gemini;
pub mod worker;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::WavError;
use crate::broker::{FunctionCall, ReasoningRequest, SpeechAudio};

pub use gemini::GeminiClient;
pub use worker::{ReasoningWorker, TtsWorker};

// ---------------------------------------------------------------------------
// CloudError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("cloud request timed out")]
    Timeout,

    /// HTTP 429: quota exhausted for now.
    #[error("rate limited by the cloud service")]
    RateLimited,

    #[error("cloud service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse cloud response: {0}")]
    Parse(String),

    #[error("cloud service returned an empty response")]
    EmptyResponse,

    #[error("could not encode utterance: {0}")]
    Encode(#[from] WavError),
}

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CloudError::Timeout
        } else {
            CloudError::Request(e.to_string())
        }
    }
}

impl CloudError {
    /// Worth retrying on a later request.
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Request(_) | CloudError::Timeout | CloudError::RateLimited => true,
            CloudError::Status { status, .. } => *status >= 500,
            CloudError::Parse(_) | CloudError::EmptyResponse | CloudError::Encode(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ReasoningReply
// ---------------------------------------------------------------------------

/// What the reasoning model answered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningReply {
    /// Spoken answer, if any.
    pub text: Option<String>,
    /// Actions to perform, in the order returned.
    pub function_calls: Vec<FunctionCall>,
}

impl ReasoningReply {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.function_calls.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningReply, CloudError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, CloudError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CloudError::RateLimited.is_transient());
        assert!(CloudError::Timeout.is_transient());
        assert!(CloudError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!CloudError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!CloudError::EmptyResponse.is_transient());
    }

    #[test]
    fn empty_reply() {
        assert!(ReasoningReply::default().is_empty());
        let reply = ReasoningReply {
            text: None,
            function_calls: vec![FunctionCall::new("next_mode")],
        };
        assert!(!reply.is_empty());
    }
}
