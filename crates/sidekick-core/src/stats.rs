//! Process-local delivery counters
//!
//! One bucket of counters per output, keyed by status (`ok`, `error`,
//! `total`). Increments are lock-free once a counter exists; the maps are only
//! write-locked to create a missing entry.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Status key for successful deliveries
pub const OK: &str = "ok";
/// Status key for failed deliveries
pub const ERROR: &str = "error";
/// Status key for deliveries attempted
pub const TOTAL: &str = "total";

type Bucket = HashMap<String, AtomicU64>;

/// Named counters per output
#[derive(Debug, Default)]
pub struct Statistics {
    outputs: RwLock<HashMap<String, Bucket>>,
}

impl Statistics {
    /// Create an empty counter store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the bucket for an output with `ok`, `error` and `total` at zero
    pub fn register_output(&self, output: &str) {
        let mut outputs = self.outputs.write();
        let bucket = outputs.entry(output.to_string()).or_default();
        for key in [OK, ERROR, TOTAL] {
            bucket
                .entry(key.to_string())
                .or_insert_with(|| AtomicU64::new(0));
        }
    }

    /// Add `value` to the `key` counter of `output`
    pub fn add(&self, output: &str, key: &str, value: u64) {
        {
            let outputs = self.outputs.read();
            if let Some(counter) = outputs.get(output).and_then(|bucket| bucket.get(key)) {
                counter.fetch_add(value, Ordering::Relaxed);
                return;
            }
        }

        let mut outputs = self.outputs.write();
        outputs
            .entry(output.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Current value of a counter, zero when it does not exist
    pub fn get(&self, output: &str, key: &str) -> u64 {
        self.outputs
            .read()
            .get(output)
            .and_then(|bucket| bucket.get(key))
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Copy of every counter, ordered for stable output
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.outputs
            .read()
            .iter()
            .map(|(output, bucket)| {
                let counters = bucket
                    .iter()
                    .map(|(key, counter)| (key.clone(), counter.load(Ordering::Relaxed)))
                    .collect();
                (output.clone(), counters)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_output_zeroes_counters() {
        let stats = Statistics::new();
        stats.register_output("ociobjectstorage");

        let snapshot = stats.snapshot();
        let bucket = &snapshot["ociobjectstorage"];
        assert_eq!(bucket.len(), 3);
        assert_eq!(bucket[OK], 0);
        assert_eq!(bucket[ERROR], 0);
        assert_eq!(bucket[TOTAL], 0);
    }

    #[test]
    fn test_add_creates_missing_counter() {
        let stats = Statistics::new();
        stats.add("ociobjectstorage", OK, 2);
        stats.add("ociobjectstorage", OK, 3);

        assert_eq!(stats.get("ociobjectstorage", OK), 5);
        assert_eq!(stats.get("ociobjectstorage", ERROR), 0);
        assert_eq!(stats.get("unknown", OK), 0);
    }

    #[test]
    fn test_register_keeps_existing_values() {
        let stats = Statistics::new();
        stats.add("ociobjectstorage", ERROR, 1);
        stats.register_output("ociobjectstorage");
        assert_eq!(stats.get("ociobjectstorage", ERROR), 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(Statistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.add("ociobjectstorage", OK, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.get("ociobjectstorage", OK), 8000);
    }
}
