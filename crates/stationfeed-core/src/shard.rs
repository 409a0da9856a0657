//! Ordered fan-out of shards across parallel workers

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free work queue distributing items to workers.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item
/// together with its position in the queue.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next item (lock-free)
    pub fn next(&self) -> Option<(usize, &S)> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|item| (i, item))
    }

    /// Total items in queue
    pub fn total(&self) -> usize {
        self.items.len()
    }
}

/// Split items into shards of at most `shard_size`, preserving order
pub fn into_shards<T>(items: Vec<T>, shard_size: usize) -> Vec<Vec<T>> {
    let shard_size = shard_size.max(1);
    let mut shards = Vec::with_capacity(items.len().div_ceil(shard_size));
    let mut current = Vec::with_capacity(shard_size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == shard_size {
            shards.push(std::mem::replace(&mut current, Vec::with_capacity(shard_size)));
        }
    }
    if !current.is_empty() {
        shards.push(current);
    }
    shards
}

/// Apply `f` to every shard on up to `workers` threads.
///
/// Output is concatenated in shard order regardless of which worker finished
/// first, so the result equals a sequential pass over the shards.
pub fn map_shards_ordered<T, U, F>(shards: Vec<Vec<T>>, workers: usize, f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&[T]) -> Vec<U> + Sync,
{
    if workers <= 1 || shards.len() <= 1 {
        return shards.iter().flat_map(|shard| f(shard.as_slice())).collect();
    }

    let queue = WorkQueue::new(shards);
    let done: Mutex<Vec<(usize, Vec<U>)>> = Mutex::new(Vec::with_capacity(queue.total()));

    rayon::scope(|s| {
        for _ in 0..workers.min(queue.total()) {
            s.spawn(|_| {
                while let Some((idx, shard)) = queue.next() {
                    let out = f(shard.as_slice());
                    done.lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .push((idx, out));
                }
            });
        }
    });

    let mut done = done
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    done.sort_unstable_by_key(|(idx, _)| *idx);
    log::debug!("Merged {} shards from {workers} workers", done.len());
    done.into_iter().flat_map(|(_, out)| out).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_hands_out_each_item_once() {
        let q = WorkQueue::new(vec![10, 20, 30]);
        assert_eq!(q.total(), 3);
        assert_eq!(q.next(), Some((0, &10)));
        assert_eq!(q.next(), Some((1, &20)));
        assert_eq!(q.next(), Some((2, &30)));
        assert_eq!(q.next(), None);
    }

    #[test]
    fn empty_queue() {
        let q: WorkQueue<i32> = WorkQueue::new(vec![]);
        assert_eq!(q.total(), 0);
        assert_eq!(q.next(), None);
    }

    #[test]
    fn into_shards_keeps_order_and_tail() {
        let shards = into_shards((0..7).collect(), 3);
        assert_eq!(shards, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
        assert!(into_shards(Vec::<u8>::new(), 3).is_empty());
    }

    #[test]
    fn parallel_output_matches_sequential() {
        let items: Vec<u32> = (0..10_000).collect();
        let keep_even = |shard: &[u32]| -> Vec<u32> {
            shard.iter().copied().filter(|n| n % 2 == 0).collect()
        };

        let sequential = map_shards_ordered(into_shards(items.clone(), 64), 1, keep_even);
        let parallel = map_shards_ordered(into_shards(items, 64), 8, keep_even);
        assert_eq!(sequential, parallel);
        assert_eq!(parallel.len(), 5_000);
        assert!(parallel.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn more_workers_than_shards() {
        let out = map_shards_ordered(vec![vec![1], vec![2]], 16, |s: &[i32]| s.to_vec());
        assert_eq!(out, vec![1, 2]);
    }
}
