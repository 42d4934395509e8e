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

//! Turns a parsed `MetricFamily` into zero or more normalized `Event`s ready
//! to publish to subscribers. Counters, gauges, and untyped samples pass
//! through as-is; histograms and summaries are first deltaed against the
//! previous scrape of the same series via a `DeltaCache`, and are dropped
//! entirely (not published with a zeroed delta) when there is no prior
//! observation to diff against.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::delta::DeltaCache;
use crate::model::{MetricFamily, MetricValue};

/// Distinguishes a direct sample from one built out of a cumulative delta,
/// carrying the metric name and value(s) so a subscriber can identify the
/// series without re-parsing the payload. Mirrors the `metric`/
/// `aggregatedMetric` event metadata kinds; their `metricName`/
/// `metricValue`/`metricSum`/`metricCount` keys are also written into
/// `payload`, stringified, for subscribers that only look at the flattened
/// map.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricMetadata {
    Metric { name: String, value: f64 },
    AggregatedMetric { name: String, sum: f64, count: i64 },
}

/// A normalized observation of one series, ready to hand to a `Subject`.
/// `payload` values are always strings, matching the exposition format's
/// own textual nature.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub provider_name: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: MetricMetadata,
    pub payload: HashMap<String, String>,
}

fn base_payload(family: &MetricFamily, labels: &[(String, String)]) -> HashMap<String, String> {
    let mut payload = HashMap::with_capacity(labels.len() + 1);
    payload.insert("Type".to_string(), family.kind.name().to_string());
    for (name, value) in labels {
        payload.insert(format!("label_{name}"), value.clone());
    }
    payload
}

/// Millisecond epoch timestamp on a sample, or the scrape's own fallback
/// when the sample carries none (`timestamp_ms == 0`).
fn resolve_timestamp(timestamp_ms: i64, scrape_timestamp: DateTime<Utc>) -> DateTime<Utc> {
    if timestamp_ms == 0 {
        return scrape_timestamp;
    }
    DateTime::from_timestamp_millis(timestamp_ms).unwrap_or(scrape_timestamp)
}

/// Build the events for every sample in `family` scraped from `url`.
/// `scrape_timestamp` is used whenever a sample carries no timestamp of its
/// own — the scrape engine's own clock at the start of the cycle, not
/// anything read off the HTTP response. Histogram/summary samples with no
/// prior observation produce no event at all.
pub fn build_events(
    url: &str,
    family: &MetricFamily,
    scrape_timestamp: DateTime<Utc>,
    cache: &DeltaCache,
) -> Vec<Event> {
    let mut events = Vec::new();
    for metric in &family.metrics {
        let timestamp = resolve_timestamp(metric.timestamp_ms, scrape_timestamp);
        match &metric.value {
            MetricValue::Scalar(value) => {
                let mut payload = base_payload(family, &metric.labels);
                payload.insert("metricName".to_string(), family.name.clone());
                payload.insert("metricValue".to_string(), value.to_string());
                events.push(Event {
                    provider_name: url.to_string(),
                    timestamp,
                    metadata: MetricMetadata::Metric {
                        name: family.name.clone(),
                        value: *value,
                    },
                    payload,
                });
            }
            MetricValue::Histogram {
                sample_sum,
                sample_count,
                buckets,
            } => {
                let delta =
                    cache.observe_histogram(url, &family.name, &metric.labels, *sample_sum, *sample_count);
                let Some(delta) = delta else { continue };
                let mut payload = base_payload(family, &metric.labels);
                payload.insert("metricName".to_string(), family.name.clone());
                payload.insert("metricSum".to_string(), delta.sample_sum.to_string());
                payload.insert("metricCount".to_string(), delta.sample_count.to_string());
                // Bucket cumulative counts are published as observed on this
                // scrape, not diffed against the previous one.
                for bucket in buckets {
                    payload.insert(
                        format!("bucket_{}", bucket.upper_bound),
                        bucket.cumulative_count.to_string(),
                    );
                }
                events.push(Event {
                    provider_name: url.to_string(),
                    timestamp,
                    metadata: MetricMetadata::AggregatedMetric {
                        name: family.name.clone(),
                        sum: delta.sample_sum,
                        count: delta.sample_count,
                    },
                    payload,
                });
            }
            MetricValue::Summary {
                sample_sum,
                sample_count,
                quantiles,
            } => {
                let delta = cache.observe_summary(
                    url,
                    &family.name,
                    &metric.labels,
                    *sample_sum,
                    *sample_count,
                    quantiles,
                );
                let Some(delta) = delta else { continue };
                let mut payload = base_payload(family, &metric.labels);
                payload.insert("metricName".to_string(), family.name.clone());
                payload.insert("metricSum".to_string(), delta.sample_sum.to_string());
                payload.insert("metricCount".to_string(), delta.sample_count.to_string());
                for quantile in &delta.quantiles {
                    payload.insert(format!("quantile_{}", quantile.quantile), quantile.value.to_string());
                }
                events.push(Event {
                    provider_name: url.to_string(),
                    timestamp,
                    metadata: MetricMetadata::AggregatedMetric {
                        name: family.name.clone(),
                        sum: delta.sample_sum,
                        count: delta.sample_count,
                    },
                    payload,
                });
            }
        }
    }
    events
}
