// Copyright (C) 2024, Tony Rippy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Per-target, per-series delta cache. Histogram and summary counters are
//! cumulative since the scraped process started; this cache turns two
//! successive cumulative observations into the signed delta between them,
//! suppressing the very first observation of a series (there is nothing to
//! subtract it from).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{LabelPair, Quantile};

/// Delta between two histogram observations of the same series. Only the
/// aggregate `sum`/`count` are deltaed — bucket cumulative counts are
/// published as-observed, not diffed, per the event builder.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramDelta {
    pub sample_sum: f64,
    pub sample_count: i64,
}

/// Delta between two summary observations of the same series.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryDelta {
    pub sample_sum: f64,
    pub sample_count: i64,
    /// Quantile *values* are instantaneous, not cumulative, so they are
    /// carried through unchanged rather than subtracted.
    pub quantiles: Vec<Quantile>,
}

fn series_key(url: &str, metric_name: &str, labels: &[LabelPair]) -> String {
    let mut sorted: Vec<&LabelPair> = labels.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut key = String::new();
    key.push_str(url);
    key.push(';');
    key.push_str(metric_name);
    for (name, value) in sorted {
        key.push(';');
        key.push_str(name);
        key.push(':');
        key.push_str(value);
    }
    key
}

#[derive(Clone)]
struct HistogramSnapshot {
    sample_sum: f64,
    sample_count: u64,
}

#[derive(Clone)]
struct SummarySnapshot {
    sample_sum: f64,
    sample_count: u64,
}

enum Snapshot {
    Histogram(HistogramSnapshot),
    Summary(SummarySnapshot),
}

/// Shared across every scrape task for a given process; keyed by target URL
/// so two targets exposing the same metric name never collide.
pub struct DeltaCache {
    previous: Mutex<HashMap<String, Snapshot>>,
}

impl DeltaCache {
    pub fn new() -> Self {
        DeltaCache {
            previous: Mutex::new(HashMap::new()),
        }
    }

    /// Record a histogram observation and return the delta against the
    /// prior observation of the same series, or `None` if this is the
    /// first observation seen for it.
    ///
    /// Deltas are emitted unclamped: if the scraped process restarted and
    /// its counters reset, the next observation legitimately produces a
    /// negative delta. Callers must not clamp it to zero — the sign is the
    /// only signal a subscriber has that a reset occurred.
    pub fn observe_histogram(
        &self,
        url: &str,
        metric_name: &str,
        labels: &[LabelPair],
        sample_sum: f64,
        sample_count: u64,
    ) -> Option<HistogramDelta> {
        let key = series_key(url, metric_name, labels);
        let mut previous = self.previous.lock().unwrap();
        let next = HistogramSnapshot {
            sample_sum,
            sample_count,
        };
        let delta = match previous.get(&key) {
            Some(Snapshot::Histogram(prev)) => Some(HistogramDelta {
                sample_sum: sample_sum - prev.sample_sum,
                sample_count: sample_count as i64 - prev.sample_count as i64,
            }),
            _ => None,
        };
        previous.insert(key, Snapshot::Histogram(next));
        delta
    }

    /// Record a summary observation and return the delta against the prior
    /// observation of the same series, or `None` on first observation.
    /// Quantile values pass through unsubtracted — see `SummaryDelta`.
    pub fn observe_summary(
        &self,
        url: &str,
        metric_name: &str,
        labels: &[LabelPair],
        sample_sum: f64,
        sample_count: u64,
        quantiles: &[Quantile],
    ) -> Option<SummaryDelta> {
        let key = series_key(url, metric_name, labels);
        let mut previous = self.previous.lock().unwrap();
        let next = SummarySnapshot {
            sample_sum,
            sample_count,
        };
        let delta = match previous.get(&key) {
            Some(Snapshot::Summary(prev)) => Some(SummaryDelta {
                sample_sum: sample_sum - prev.sample_sum,
                sample_count: sample_count as i64 - prev.sample_count as i64,
                quantiles: quantiles.to_vec(),
            }),
            _ => None,
        };
        previous.insert(key, Snapshot::Summary(next));
        delta
    }
}

impl Default for DeltaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_suppressed() {
        let cache = DeltaCache::new();
        let delta = cache.observe_histogram("http://a", "latency", &[], 1.0, 1);
        assert!(delta.is_none());
    }

    #[test]
    fn second_observation_yields_signed_delta() {
        let cache = DeltaCache::new();
        assert!(cache
            .observe_histogram("http://a", "latency", &[], 10.0, 5)
            .is_none());
        let delta = cache
            .observe_histogram("http://a", "latency", &[], 16.0, 9)
            .unwrap();
        assert_eq!(delta.sample_sum, 6.0);
        assert_eq!(delta.sample_count, 4);
    }

    #[test]
    fn restart_produces_unclamped_negative_delta() {
        let cache = DeltaCache::new();
        assert!(cache
            .observe_histogram("http://a", "latency", &[], 100.0, 50)
            .is_none());
        let delta = cache
            .observe_histogram("http://a", "latency", &[], 2.0, 1)
            .unwrap();
        assert_eq!(delta.sample_count, 1 - 50);
        assert_eq!(delta.sample_sum, 2.0 - 100.0);
    }

    #[test]
    fn distinct_label_sets_are_independent_series() {
        let cache = DeltaCache::new();
        let a = vec![("path".to_string(), "/a".to_string())];
        let b = vec![("path".to_string(), "/b".to_string())];
        assert!(cache.observe_summary("http://x", "latency", &a, 1.0, 1, &[]).is_none());
        assert!(cache.observe_summary("http://x", "latency", &b, 5.0, 5, &[]).is_none());
        let delta = cache.observe_summary("http://x", "latency", &a, 2.0, 2, &[]).unwrap();
        assert_eq!(delta.sample_count, 1);
    }

    #[test]
    fn same_metric_name_on_different_urls_does_not_collide() {
        let cache = DeltaCache::new();
        assert!(cache.observe_summary("http://x", "latency", &[], 1.0, 1, &[]).is_none());
        // A fresh URL sees this series for the first time, regardless of
        // what http://x has already recorded for the same name.
        assert!(cache.observe_summary("http://y", "latency", &[], 1.0, 1, &[]).is_none());
    }

    #[test]
    fn label_order_does_not_affect_series_identity() {
        let ordered = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        let reordered = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ];
        assert_eq!(
            series_key("http://x", "m", &ordered),
            series_key("http://x", "m", &reordered)
        );
    }
}
