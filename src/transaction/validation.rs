/// Boundary validation for submitted transactions
use crate::error::ChainError;
use crate::transaction::types::{Transaction, TransactionRequest};

/// Longest accepted value for any single transaction field, in bytes.
pub const MAX_FIELD_LENGTH: usize = 1_024;

const REQUIRED_FIELDS: [&str; 3] = ["sender_key", "receiver_key", "book_key"];

impl TransactionRequest {
    /// Checks that every required field is present and non-blank, returning
    /// the immutable [`Transaction`] on success.
    pub fn into_transaction(self) -> Result<Transaction, ChainError> {
        let values = [self.sender_key, self.receiver_key, self.book_key];

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .zip(values.iter())
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ChainError::ValidationError(format!(
                "Missing keys: {}",
                missing.join(", ")
            )));
        }

        for (name, value) in REQUIRED_FIELDS.iter().zip(values.iter()) {
            let len = value.as_deref().map_or(0, str::len);
            if len > MAX_FIELD_LENGTH {
                return Err(ChainError::ValidationError(format!(
                    "{} too long: {} bytes (max: {})",
                    name, len, MAX_FIELD_LENGTH
                )));
            }
        }

        let [sender, receiver, book] = values;
        Ok(Transaction::new(
            sender.unwrap_or_default(),
            receiver.unwrap_or_default(),
            book.unwrap_or_default(),
        ))
    }
}
