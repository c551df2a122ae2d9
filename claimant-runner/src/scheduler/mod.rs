//! Scheduler layer for the runner
//!
//! Repeats poll cycles over the registered work units until shutdown, and
//! decides what an unclassified job error does to the process.

pub mod poller;

pub use poller::{FatalErrorPolicy, PollScheduler, PollSettings, PollerState};
