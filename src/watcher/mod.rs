//! File watching for the transform pipeline.
//!
//! # Architecture
//!
//! ```text
//! WatchSource (NotifySource | ChannelSource)
//!   - initial glob scan -> add events
//!   - notify events, settled by Debouncer -> add/change events
//!         |
//!   Orchestrator
//!   - one FileTransform, template resolved once
//!   - one task per event
//! ```

mod debouncer;
mod error;
mod orchestrator;
mod source;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use orchestrator::{Orchestrator, SessionSummary};
pub use source::{ChannelSource, NotifySource, WatchConfig, WatchEvent, WatchEventKind, WatchSource};
