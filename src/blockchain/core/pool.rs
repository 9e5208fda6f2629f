use crate::transaction::Transaction;

/// Transactions accepted but not yet sealed into a block, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct PendingPool {
    transactions: Vec<Transaction>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    /// Removes and returns every pending transaction, leaving the pool empty.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
