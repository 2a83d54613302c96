//! Cursor helpers shared by the table layer.

use crate::{KvIter, RetrieverMutator, Result};

/// Advances `it` until it is invalid or `pred` holds for the current key.
pub fn next_until(it: &mut dyn KvIter, mut pred: impl FnMut(&[u8]) -> bool) -> Result<()> {
    while it.valid() && !pred(it.key()) {
        it.next()?;
    }
    Ok(())
}

/// Deletes every visible key starting with `prefix`, returning how many were deleted.
pub fn delete_with_prefix<R: RetrieverMutator + ?Sized>(rm: &mut R, prefix: &[u8]) -> Result<usize> {
    let keys = {
        let mut it = rm.seek(prefix)?;
        let mut keys = Vec::new();
        while it.valid() && it.key().starts_with(prefix) {
            keys.push(it.key().to_vec());
            it.next()?;
        }
        keys
    };
    for key in &keys {
        rm.delete(key)?;
    }
    log::trace!("DELETED WITH PREFIX: {} keys under {}", keys.len(), hex::encode(prefix));
    Ok(keys.len())
}
