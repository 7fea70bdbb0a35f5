//! Typed publish/subscribe event bus (spec §9).
//!
//! Grounded on `weavegraph::event_bus`: a `tokio::sync::broadcast`-backed
//! [`hub::EventHub`] wrapped in an [`bus::EventBus`] that owns a set of
//! [`sink::EventSink`]s, each running on its own worker task so a slow
//! sink cannot block another. The difference from the source repo is the
//! payload: instead of workflow node events, [`event::Event`] is the
//! fixed, closed channel set the spec names — no custom channels, no
//! inheritance.

mod bus;
mod emitter;
mod event;
mod hub;
mod sink;

pub use bus::EventBus;
pub use emitter::{EmitterError, EventEmitter};
pub use event::{
    BatchCompletedPayload, BatchCreatedPayload, CleanupCompletedPayload, Event,
    JobAttemptFailedPayload, JobCompletedPayload, JobDeadLetteredPayload, JobEnqueuedPayload,
    JobFailedPayload, JobStartedPayload, MetricsUpdatedPayload, QueueOverflowPayload,
    RollbackCompletedPayload, RollbackCreatedPayload, RollbackFailedPayload,
    RollbackProgressPayload, RollbackStartedPayload,
};
pub use hub::{EventHub, EventHubMetrics, EventStream};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
