//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::MAX_FIELD_LENGTH;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;

    fn request(sender: &str, receiver: &str, book: &str) -> TransactionRequest {
        TransactionRequest {
            sender_key: Some(sender.to_string()),
            receiver_key: Some(receiver.to_string()),
            book_key: Some(book.to_string()),
        }
    }

    #[test]
    fn test_valid_request_converts() {
        let tx = request("alice", "bob", "isbn-978").into_transaction().unwrap();
        assert_eq!(tx, Transaction::new("alice", "bob", "isbn-978"));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut req = request("alice", "bob", "isbn-978");
        req.receiver_key = None;
        let err = req.into_transaction().unwrap_err();
        assert_eq!(
            err,
            ChainError::ValidationError("Missing keys: receiver_key".to_string())
        );
    }

    #[test]
    fn test_blank_fields_are_rejected() {
        let err = request("  ", "", "isbn").into_transaction().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Missing keys: sender_key, receiver_key"
        );
    }

    #[test]
    fn test_oversized_field_is_rejected() {
        let long = "x".repeat(MAX_FIELD_LENGTH + 1);
        let err = request("alice", "bob", &long).into_transaction().unwrap_err();
        assert!(err.to_string().contains("book_key too long"));
    }

    #[test]
    fn test_wire_field_names() {
        let tx = Transaction::new("a", "b", "c");
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["sender_key"], "a");
        assert_eq!(json["receiver_key"], "b");
        assert_eq!(json["book_key"], "c");
    }

    #[test]
    fn test_canonical_encoding_is_key_sorted() {
        let tx = Transaction::new("a", "b", "c");
        assert_eq!(
            crate::crypto::canonical_json(&tx).unwrap(),
            r#"{"book_key": "c", "receiver_key": "b", "sender_key": "a"}"#
        );
    }
}
