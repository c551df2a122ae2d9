//! Claim and execution engine
//!
//! [`ClaimEngine`] turns a unit's claimable query into a batch of rows this
//! process now owns; [`JobExecutor`] runs the unit's handler over that batch
//! and records failures.

mod claim;
mod executor;

pub use claim::{ClaimAttempt, ClaimEngine};
pub use executor::JobExecutor;
