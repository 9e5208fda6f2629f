// Thin re-export module: the ledger lives in `blockchain/core.rs`, split into
// chain management, the pending pool, and chain validation.

pub mod core;
pub use core::*;
