//! # Event System
//!
//! Two complementary halves:
//!
//! - [`EventPublisher`]: in-process broadcast of every lifecycle event,
//!   for metrics hooks and tests; delivery is best-effort.
//! - [`EventRecorder`]: durable, per-type opt-in audit trail appended to
//!   the task store.

pub mod publisher;
pub mod recorder;

pub use publisher::{EventPublisher, PublishedEvent};
pub use recorder::EventRecorder;
