//! Observability for the reconciler
//!
//! - Structured logging through `tracing`, installed by [`init_logging`]
//! - The [`ClusterEvent`] catalog and [`EventRecorder`] sinks
//!
//! # Principles
//!
//! 1. Observability is one-way: no pass depends on an event being delivered
//! 2. Every state transition and every repair action is an event
//! 3. Log fields are key-value, never interpolated into the message
//!
//! # Usage
//!
//! ```ignore
//! use clusterkeeper::observability::{ClusterEvent, EventRecorder, TracingEventRecorder};
//!
//! TracingEventRecorder.record(&key, ClusterEvent::Promote, "10.0.0.2 promoted");
//! ```

mod events;
mod logging;
mod recorder;

pub use events::ClusterEvent;
pub use logging::{init_logging, LogFormat};
pub use recorder::{EventRecord, EventRecorder, MemoryEventRecorder, TracingEventRecorder};
