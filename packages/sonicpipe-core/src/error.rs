//! Centralized error type for the pipeline.
//!
//! Only the fatal error kinds from the component design carry `Result::Err`;
//! non-fatal conditions (producer drops, catch-up, underflow, frame-queue
//! overflow) are absorbed and reported through [`crate::stats`] instead.

use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide a machine-readable error code.
///
/// Kept deliberately separate from `Display`/`Error::to_string()` so the
/// human-readable message can change without breaking anything that matches
/// on the code.
pub trait ErrorCode {
    /// Returns a stable, machine-readable error code.
    fn code(&self) -> &'static str;
}

/// Fatal errors produced by the pipeline.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum PipelineError {
    /// Session configuration failed validation before any frame was produced.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The sink connection could not be established or the handshake did not
    /// complete within its timeout.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// An encoder reported a fatal fault via its error channel.
    #[error("encoder fault: {0}")]
    EncoderFault(String),

    /// The sink connection closed while a session was running.
    #[error("sink closed: {0}")]
    SinkClosed(String),

    /// Catch-all for conditions that don't fit the named kinds above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns a machine-readable error code, mirrored into
    /// [`crate::supervisor::SupervisorMessage::Error`].
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::HandshakeFailed(_) => "handshake_failed",
            Self::EncoderFault(_) => "encoder_fault",
            Self::SinkClosed(_) => "sink_closed",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl ErrorCode for PipelineError {
    fn code(&self) -> &'static str {
        PipelineError::code(self)
    }
}

/// Convenient Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
