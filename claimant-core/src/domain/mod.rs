//! Core domain types
//!
//! This module contains the core domain structures used across Claimant crates.
//! These types are shared between the store client (for transport) and the
//! runner (for claiming and execution).

pub mod batch;
pub mod job;
pub mod payload;
pub mod row;
pub mod token;

pub use batch::{ClaimBatch, ClaimedRow};
pub use job::{JobError, JobOutcome};
pub use payload::{ClaimPayload, FailurePayload, StatusPayload};
pub use row::{DEFAULT_IDENTIFIER_FIELD, Row};
pub use token::EntityTag;
