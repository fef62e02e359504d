//! Commission distribution and pin-quota engine for a promoter network.
//!
//! Onboarding a customer consumes one pin from the initiating promoter and
//! splits a fixed pool up to four levels of the promoter hierarchy, with the
//! remainder credited to the admin account.

pub mod clock;
pub mod command;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod event;
pub mod hierarchy;
pub mod idempotency;
pub mod ledger;
pub mod pins;
pub mod pool;
pub mod reconciliation;
pub mod rng;
pub mod store;
pub mod types;
pub mod validation;
pub mod wallet;
