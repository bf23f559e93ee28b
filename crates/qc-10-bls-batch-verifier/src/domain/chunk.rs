//! Stable, balanced splitting of work into chunks.
//!
//! Chunks never differ in size by more than one item, so no worker receives a
//! tiny remainder chunk that pays full dispatch overhead for a few sets.

/// Split `items` into the fewest chunks of at most `max_per_chunk` items.
///
/// `ceil(N / max)` chunks are produced and items are spread evenly across
/// them. Order is preserved within and across chunks.
pub fn chunkify_maximize_chunk_size<T>(items: Vec<T>, max_per_chunk: usize) -> Vec<Vec<T>> {
    let max_per_chunk = max_per_chunk.max(1);
    let chunk_count = items.len().div_ceil(max_per_chunk);
    split_evenly(items, chunk_count)
}

/// Split `items` into as many chunks of at least `min_per_chunk` items as fit.
///
/// `max(1, floor(N / min))` chunks are produced and items are spread evenly,
/// so every chunk holds between `min` and `2 * min - 1` items (or all of them
/// when `N < min`).
pub fn chunkify_min_chunk_size<T>(items: Vec<T>, min_per_chunk: usize) -> Vec<Vec<T>> {
    let min_per_chunk = min_per_chunk.max(1);
    let chunk_count = (items.len() / min_per_chunk).max(1);
    split_evenly(items, chunk_count)
}

fn split_evenly<T>(items: Vec<T>, chunk_count: usize) -> Vec<Vec<T>> {
    if items.is_empty() || chunk_count == 0 {
        return Vec::new();
    }

    let base = items.len() / chunk_count;
    let larger = items.len() % chunk_count;

    let mut iter = items.into_iter();
    (0..chunk_count)
        .map(|i| {
            let size = if i < larger { base + 1 } else { base };
            iter.by_ref().take(size).collect()
        })
        .collect()
}
