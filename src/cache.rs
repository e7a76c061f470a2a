//! Analysis cache shared between charts
//!
//! Derived analyses are keyed by a content fingerprint of the chart (its
//! configuration, box scale and matrix) plus a label naming the analysis
//! and its parameters. Charts built from identical inputs share entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::engine::{Breakout, Count, IndicatorSeries, RatedSignal, Signal, Trendline};
use crate::error::Result;

/// One cached analysis result
#[derive(Debug, Clone)]
pub enum Artifact {
    Breakouts(Arc<Vec<Breakout>>),
    Trendlines(Arc<Vec<Trendline>>),
    Signals(Arc<Vec<Signal>>),
    RatedSignals(Arc<Vec<RatedSignal>>),
    Counts(Arc<Vec<Count>>),
    Indicators(Arc<Vec<IndicatorSeries>>),
}

/// Values that can be stored as an [`Artifact`]
pub trait Cacheable: Sized {
    fn into_artifact(value: Arc<Self>) -> Artifact;
    fn from_artifact(artifact: &Artifact) -> Option<Arc<Self>>;
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for Vec<$ty> {
            fn into_artifact(value: Arc<Self>) -> Artifact {
                Artifact::$variant(value)
            }

            fn from_artifact(artifact: &Artifact) -> Option<Arc<Self>> {
                match artifact {
                    Artifact::$variant(value) => Some(Arc::clone(value)),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(Breakout, Breakouts);
cacheable!(Trendline, Trendlines);
cacheable!(Signal, Signals);
cacheable!(RatedSignal, RatedSignals);
cacheable!(Count, Counts);
cacheable!(IndicatorSeries, Indicators);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: String,
    analysis: String,
}

/// Hex SHA-256 of the JSON serialisation of `parts`
pub fn fingerprint<T: Serialize + ?Sized>(parts: &T) -> Option<String> {
    match serde_json::to_vec(parts) {
        Ok(serialized) => Some(hex::encode(Sha256::digest(serialized))),
        Err(e) => {
            warn!("Chart could not be fingerprinted, analyses are not cached: {}", e);
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: Mutex<HashMap<CacheKey, Artifact>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Artifact>> {
        // entries are only ever inserted whole, a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached value for `(fingerprint, analysis)`, computing it on a miss
    ///
    /// `compute` runs outside the lock, so two threads may compute the same
    /// entry; the first one inserted is kept and returned to both.
    pub fn get_or_compute<T, F>(&self, fingerprint: &str, analysis: &str, compute: F) -> Result<Arc<T>>
    where
        T: Cacheable,
        F: FnOnce() -> Result<T>,
    {
        let key = CacheKey {
            fingerprint: fingerprint.to_string(),
            analysis: analysis.to_string(),
        };

        if let Some(value) = self.lock().get(&key).and_then(T::from_artifact) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for {} ({})", analysis, &fingerprint[..fingerprint.len().min(12)]);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {} ({})", analysis, &fingerprint[..fingerprint.len().min(12)]);
        let computed = T::into_artifact(Arc::new(compute()?));

        let mut entries = self.lock();
        let stored = entries.entry(key).or_insert(computed);
        T::from_artifact(stored).ok_or_else(|| {
            crate::error::PnfError::Shape(format!("cache entry for {} holds another analysis", analysis))
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::IndicatorSeries;

    fn series(label: &str) -> Vec<IndicatorSeries> {
        vec![IndicatorSeries {
            label: label.to_string(),
            values: vec![Some(1.0)],
        }]
    }

    #[test]
    fn test_second_lookup_hits() {
        let cache = AnalysisCache::new();
        let first: Arc<Vec<IndicatorSeries>> = cache.get_or_compute("abc", "sma", || Ok(series("a"))).unwrap();
        let second: Arc<Vec<IndicatorSeries>> = cache
            .get_or_compute("abc", "sma", || -> Result<Vec<IndicatorSeries>> { panic!("recomputed") })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), (1, 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_separate_fingerprint_and_analysis() {
        let cache = AnalysisCache::new();
        let _: Arc<Vec<IndicatorSeries>> = cache.get_or_compute("abc", "sma", || Ok(series("a"))).unwrap();
        let other: Arc<Vec<IndicatorSeries>> = cache.get_or_compute("def", "sma", || Ok(series("b"))).unwrap();
        let _: Arc<Vec<IndicatorSeries>> = cache.get_or_compute("abc", "ema", || Ok(series("c"))).unwrap();

        assert_eq!(other[0].label, "b");
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = AnalysisCache::new();
        let failed: Result<Arc<Vec<IndicatorSeries>>> =
            cache.get_or_compute("abc", "sma", || Err(crate::error::PnfError::NoTrend));
        assert!(failed.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_shared_between_threads() {
        let cache = AnalysisCache::shared();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let value: Arc<Vec<IndicatorSeries>> =
                        cache.get_or_compute("abc", "sma", || Ok(series(&i.to_string()))).unwrap();
                    value[0].label.clone()
                })
            })
            .collect();

        let labels: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(labels.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = fingerprint(&(1, "x")).unwrap();
        let b = fingerprint(&(1, "x")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint(&(2, "x")).unwrap());
    }
}
