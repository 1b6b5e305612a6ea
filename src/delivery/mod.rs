//! Outbound delivery: message rendering, the retrying channel and the
//! tracker that owns fire-and-forget sends.

mod backoff;
mod channel;
mod error;
mod message;
mod tracker;

pub use backoff::Backoff;
pub use channel::{
    AttemptObserver, AttemptReport, AttemptResult, DeliveryChannel, DeliveryOutcome, FailureKind,
    PreSendTransform,
};
pub use error::DeliveryError;
pub use message::OutboundMessage;
pub use tracker::{DeliveryTracker, DrainReport, TaskHandle, TaskStatus};
