use crate::error::FetchError;

/// Ids sent per `videos` enrichment request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Splits `items` into contiguous groups of at most `size`, keeping order.
///
/// The returned iterator borrows `items`; call again to start over.
pub fn chunks<T>(items: &[T], size: usize) -> Result<std::slice::Chunks<'_, T>, FetchError> {
    if size == 0 {
        return Err(FetchError::InvalidSize(size));
    }
    Ok(items.chunks(size))
}
