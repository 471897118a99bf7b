//! # Pattern Learning
//!
//! Query fingerprinting, the in-memory reasoning bank, and its durable
//! SQLite copy.

pub mod bank;
pub mod fingerprint;
pub mod store;

pub use bank::{BankStats, Pattern, ReasoningBank};
pub use fingerprint::fingerprint;
pub use store::{PatternStore, StoredPattern};
