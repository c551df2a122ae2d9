//! Claimant Core
//!
//! Core types and abstractions for the Claimant job-claim poller.
//!
//! This crate contains the domain types shared by the store client (which
//! moves rows over the wire) and the runner (which claims and processes them):
//! - Rows and their identifiers
//! - Entity tags used for optimistic concurrency
//! - Claim batches, job errors and outcomes
//! - Claim and failure payload strategies

pub mod domain;
