// SPDX-License-Identifier: MIT

//! Bounded-concurrency batch execution.
//!
//! Runs many independent fetches (e.g. per-repository language lookups)
//! with a capped number admitted at a time. Results come back in input
//! order regardless of completion order. The executor does not catch on a
//! worker's behalf: workers that can fail are expected to map their own
//! errors to a fallback value (an empty language map, say) so one bad
//! repository never aborts the batch.

use futures_util::{stream, StreamExt};
use std::future::Future;

/// Run `worker` over `items` with at most `concurrency` in flight.
pub async fn batch<I, T, F, Fut>(items: Vec<I>, worker: F, concurrency: usize) -> Vec<T>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items.into_iter().map(worker))
        .buffered(concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_preserves_input_order_with_reversed_completion() {
        // Earlier items sleep longer, so completion order is reversed.
        let items = vec![4u64, 3, 2, 1];
        let results = batch(
            items,
            |delay| async move {
                tokio::time::sleep(Duration::from_millis(delay * 10)).await;
                delay * 100
            },
            4,
        )
        .await;

        assert_eq!(results, vec![400, 300, 200, 100]);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = batch(
            (0..20).collect::<Vec<u32>>(),
            |i| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    i
                }
            },
            6,
        )
        .await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 6);
    }

    #[tokio::test]
    async fn test_worker_fallbacks_do_not_abort_the_batch() {
        // Workers map failures to a fallback value themselves.
        let results = batch(
            vec!["ok", "bad", "ok"],
            |kind| async move {
                if kind == "bad" {
                    Vec::new()
                } else {
                    vec![("Rust".to_string(), 1024u64)]
                }
            },
            2,
        )
        .await;

        assert_eq!(results[0].len(), 1);
        assert!(results[1].is_empty());
        assert_eq!(results[2].len(), 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let results = batch(vec![1, 2, 3], |i| async move { i }, 0).await;
        assert_eq!(results, vec![1, 2, 3]);
    }
}
