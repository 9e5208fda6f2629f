use crate::crypto::HexDigest;
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

use super::pool::PendingPool;
use super::validation::{check_chain, validate_chain};

/// Previous-hash carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position in the chain.
    pub index: u64,
    #[serde(rename = "transaction", alias = "transactions", default)]
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
}

impl Block {
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        Block {
            index,
            transactions,
            previous_hash,
        }
    }

    pub fn genesis() -> Self {
        Block::new(1, Vec::new(), GENESIS_PREVIOUS_HASH.to_string())
    }

    /// SHA-256 of the block's canonical encoding.
    pub fn hash(&self) -> Result<HexDigest, ChainError> {
        crate::crypto::hash(self)
    }
}

/// The chain of sealed blocks plus the pool of transactions waiting for the
/// next one.
///
/// The chain is never empty and only changes by appending through
/// [`Ledger::new_block`] or by a whole-chain swap through
/// [`Ledger::replace_chain`].
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<Block>,
    pending: PendingPool,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        Ledger {
            blocks: vec![Block::genesis()],
            pending: PendingPool::new(),
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last_block(&self) -> &Block {
        // The constructor seals genesis and replacement never installs an
        // empty chain.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn pending(&self) -> &PendingPool {
        &self.pending
    }

    /// Queues a transaction and returns the index of the block that will
    /// contain it.
    pub fn new_transaction(
        &mut self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        book: impl Into<String>,
    ) -> u64 {
        self.add_transaction(Transaction::new(sender, receiver, book))
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> u64 {
        self.pending.add_transaction(tx);
        self.blocks.len() as u64 + 1
    }

    /// Seals the pending pool into a new block at the tail.
    ///
    /// Without an explicit `previous_hash` the block links to the hash of the
    /// current tail.
    pub fn new_block(&mut self, previous_hash: Option<String>) -> Result<Block, ChainError> {
        let previous_hash = match previous_hash.filter(|h| !h.is_empty()) {
            Some(hash) => hash,
            None => match self.blocks.last() {
                Some(tail) => tail.hash()?,
                None => GENESIS_PREVIOUS_HASH.to_string(),
            },
        };

        let block = Block::new(
            self.blocks.len() as u64 + 1,
            self.pending.drain(),
            previous_hash,
        );
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Hash-link check of an arbitrary candidate sequence.
    pub fn validate(chain: &[Block]) -> bool {
        validate_chain(chain)
    }

    /// Installs `candidate` in place of the current chain when it is both
    /// strictly longer and valid. The pending pool is left untouched.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), ChainError> {
        if candidate.len() <= self.blocks.len() {
            return Err(ChainError::IntegrityError(format!(
                "Candidate chain of length {} is not longer than local chain of length {}.",
                candidate.len(),
                self.blocks.len()
            )));
        }
        check_chain(&candidate)?;
        self.blocks = candidate;
        Ok(())
    }
}
