//! Shared primitive types used across the commission engine.

/// A promoter identifier.
pub type PromoterId = String;

/// A customer identifier.
pub type CustomerId = String;

/// Commission and pool amounts, in whole currency units.
pub type Amount = i64;

/// Hierarchy level. 1 = initiator, 0 = admin fallback.
pub type Level = u8;

/// The level stamped on the admin remainder entry.
pub const ADMIN_LEVEL: Level = 0;

/// Wallet key used for the administrative account (it has no promoter id).
/// `*` never passes id validation, so no promoter can claim this key.
pub const ADMIN_WALLET_KEY: &str = "*admin";
