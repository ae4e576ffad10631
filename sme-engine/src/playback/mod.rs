//! Playback engine and its components
//!
//! Leaf first: `timing` (wall clock → media time), `buffer` (time-keyed
//! output window), `pipeline` (demux → decode driver), `state` (tagged
//! playback state), `engine` (operations), `streaming` (per-tick
//! presentation and the driver task), `perf` (instrumentation).
//!
//! **Failure semantics:** only `load` reports errors. Decode faults are
//! logged, counted and broadcast as `DecodeError` events while playback
//! continues with a gap; operations that do not apply to the current state
//! are logged and ignored.

pub mod buffer;
pub mod engine;
pub mod events;
pub mod perf;
pub mod pipeline;
pub mod state;
pub mod streaming;
pub mod timing;

pub use buffer::{BufferRange, OutputBuffer};
pub use engine::{EngineStatus, PlaybackEngine};
pub use perf::{PerfStats, PhaseStats};
pub use pipeline::{PassOutcome, PassReport};
pub use state::PlaybackState;
pub use streaming::{spawn_engine, EngineCommand, EngineHandle, TickOutcome};
pub use timing::TimingController;
