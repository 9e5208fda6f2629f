use super::chain::Block;
use crate::error::ChainError;

/// Walks `chain` from the second block on, checking that every block names
/// the hash of its predecessor and carries the next index.
///
/// The first block must sit at index 1; its previous-hash is never
/// re-derived. An empty sequence is rejected.
pub fn check_chain(chain: &[Block]) -> Result<(), ChainError> {
    let first = chain.first().ok_or_else(|| {
        ChainError::IntegrityError("Chain is empty; a genesis block is required.".to_string())
    })?;
    if first.index != 1 {
        return Err(ChainError::IntegrityError(format!(
            "Chain must start at index 1, got {}.",
            first.index
        )));
    }

    for pair in chain.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);

        if previous.index.checked_add(1) != Some(current.index) {
            return Err(ChainError::IntegrityError(format!(
                "Invalid block index after {}: got {}.",
                previous.index, current.index
            )));
        }

        let expected = previous.hash()?;
        if current.previous_hash != expected {
            return Err(ChainError::IntegrityError(format!(
                "Invalid previous block hash at index {}. Expected {}, but got {}.",
                current.index, expected, current.previous_hash
            )));
        }
    }
    Ok(())
}

/// Boolean form of [`check_chain`].
pub fn validate_chain(chain: &[Block]) -> bool {
    check_chain(chain).is_ok()
}
