//! bookledger - a replicated, append-only ledger of book transactions
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the ledger, the pending pool and chain validation
//! - [`transaction`] - Transaction records and boundary validation
//!
//! ## Cryptography
//! - [`crypto`] - Canonical encoding and SHA-256 hashing
//!
//! ## Networking & Replication
//! - [`network`] - Peer addresses, the peer registry and chain transports
//! - [`sync`] - Longest-valid-chain resolution and transaction propagation
//!
//! ## Integration
//! - [`api`] - HTTP service (feature `api`)
//! - [`node`] - Node lifecycle orchestration
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Networking & Replication
// ============================================================================
pub mod network;
pub mod sync;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
