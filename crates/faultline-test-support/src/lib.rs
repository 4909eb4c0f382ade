//! Shared test doubles for the Faultline error tracker.

mod clock;
mod notifier;
mod store;

pub use clock::FixedClock;
pub use notifier::{FailingNotifier, HangingNotifier, RecordingNotifier};
pub use store::{FailingErrorStore, FlakyErrorStore, InMemoryErrorStore, SlowErrorStore};
