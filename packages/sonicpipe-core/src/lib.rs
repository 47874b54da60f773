//! sonicpipe-core - shared library for the sonicpipe audio pipeline.
//!
//! Turns a live, real-time audio capture into encoded frames on a
//! companion WebSocket connection: a lock-free ring between the capture
//! callback and a single-threaded consumer, a polymorphic encoder across
//! four codecs, and the backpressure/catch-up/underflow smoothing that
//! keeps the pipeline bounded when either side falls behind.
//!
//! # Architecture
//!
//! - [`ring`]: the lock-free single-producer/single-consumer sample ring.
//! - [`producer`]: the real-time-thread-safe entry point into the ring.
//! - [`frame_assembler`]: accumulates ring samples into codec-sized frames.
//! - [`codec`]: the polymorphic encoder (AAC, Ogg Vorbis, FLAC, PCM).
//! - [`policy`]: the realtime/quality threshold set a session is pinned to.
//! - [`frame_queue`]: the bounded byte-capped FIFO used in quality mode.
//! - [`consumer`]: the cooperative consumer loop tying the above together.
//! - [`stats`]: per-interval metrics aggregation and timeline.
//! - [`supervisor`]: the outbound/inbound control-plane message set.
//! - [`sink`]: the sink trait and its WebSocket/in-memory implementations.
//! - [`session`]: session lifecycle ownership and the state machine.
//! - [`config`]: validated, immutable session configuration.
//! - [`error`]: centralized fatal error type.
//! - [`dither`]: shared TPDF quantization helper.
//! - [`ramp`]: fade-in/fade-out helpers around ring discontinuities.
//! - [`protocol_constants`]: fixed protocol/timing constants.

#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod consumer;
pub mod dither;
pub mod error;
pub mod frame_assembler;
pub mod frame_queue;
pub mod policy;
pub mod producer;
pub mod protocol_constants;
pub mod ramp;
pub mod ring;
pub mod session;
pub mod sink;
pub mod stats;
pub mod supervisor;

pub use codec::{Codec, CodecEngine, EncodedOutput};
pub use config::{EncoderConfig, RingConfig, RingElementType, SessionConfig};
pub use consumer::ConsumerLoop;
pub use error::{ErrorCode, PipelineError, PipelineResult};
pub use frame_assembler::FrameAssembler;
pub use frame_queue::FrameQueue;
pub use policy::{LatencyMode, StreamingPolicy};
pub use producer::{CaptureBlock, Producer};
pub use session::{Session, SessionState, SessionStateHandle};
pub use sink::{ChannelSink, Sink, WsSink};
pub use stats::{MetricSnapshot, StatsCollector};
pub use supervisor::{
    LoggingSupervisor, NoopSupervisor, Supervisor, SupervisorCommand, SupervisorMessage,
};
