//! Supervisor interface: outbound session events and inbound control
//! commands (§6 "Supervisor interface").
//!
//! The distilled interface is realized here as a trait boundary rather than
//! a concrete transport, mirroring the source crate's `EventEmitter` /
//! `NoopEventEmitter` / `LoggingEventEmitter` triad — the seam at which a
//! real control-plane connection would be plugged in is this trait, not a
//! specific channel implementation.

use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::PipelineError;
use crate::stats::MetricSnapshot;

/// Outbound messages a session posts to its supervisor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorMessage {
    Ready,
    Connected { stream_id: String },
    Disconnected,
    Error { code: &'static str, message: String },
    StreamReady,
    PlaybackStarted,
    PlaybackResults { speaker_ips: Vec<String> },
    PlaybackError { message: String },
    Stats(MetricSnapshot),
    MetricsDump { timeline: Vec<MetricSnapshot> },
}

impl From<&PipelineError> for SupervisorMessage {
    fn from(err: &PipelineError) -> Self {
        SupervisorMessage::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Inbound commands from the supervisor (§6: "Inbound from supervisor:
/// INIT, STOP, START_PLAYBACK{...}, METADATA_UPDATE{...}").
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorCommand {
    Init(SessionConfig),
    Stop,
    StartPlayback {
        speaker_ips: Vec<String>,
        metadata: Option<serde_json::Value>,
        sync_speakers: bool,
        video_sync_enabled: bool,
    },
    MetadataUpdate {
        metadata: serde_json::Value,
    },
}

/// Trait services depend on to post session events, decoupling them from
/// whatever transport eventually carries a `SupervisorMessage` to the
/// controlling process.
pub trait Supervisor: Send + Sync {
    fn notify(&self, message: SupervisorMessage);
}

/// Discards every message. Used in tests and any embedding that drives a
/// session without a control-plane connection.
pub struct NoopSupervisor;

impl Supervisor for NoopSupervisor {
    fn notify(&self, _message: SupervisorMessage) {}
}

/// Logs every message at debug level. The default for the demo binary
/// (§10.E) when no richer supervisor is wired up.
pub struct LoggingSupervisor;

impl Supervisor for LoggingSupervisor {
    fn notify(&self, message: SupervisorMessage) {
        tracing::debug!(?message, "supervisor_message");
    }
}
