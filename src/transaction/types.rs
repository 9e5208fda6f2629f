/// Transaction types for bookledger
use serde::{Deserialize, Serialize};

/// A book changing hands between two parties.
///
/// Field names on the wire follow the node protocol (`sender_key`,
/// `receiver_key`, `book_key`) so chains exchanged between peers hash
/// identically on every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "sender_key")]
    pub sender: String,
    #[serde(rename = "receiver_key")]
    pub receiver: String,
    #[serde(rename = "book_key")]
    pub book: String,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        book: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            book: book.into(),
        }
    }
}

/// Transaction as submitted by a client; every field is optional until
/// checked by [`TransactionRequest::into_transaction`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRequest {
    #[serde(default)]
    pub sender_key: Option<String>,
    #[serde(default)]
    pub receiver_key: Option<String>,
    #[serde(default)]
    pub book_key: Option<String>,
}

impl From<&Transaction> for TransactionRequest {
    fn from(tx: &Transaction) -> Self {
        Self {
            sender_key: Some(tx.sender.clone()),
            receiver_key: Some(tx.receiver.clone()),
            book_key: Some(tx.book.clone()),
        }
    }
}
