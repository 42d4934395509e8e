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

//! In-memory representation of a Prometheus exposition: families, metrics,
//! labels, and the per-type sample payloads. Shared by the parser and the
//! scrape engine; carries no behavior beyond construction.

/// A metric family's declared type. Defaults to `Untyped` when a family is
/// referenced by a sample line before any `# TYPE` directive names it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    #[default]
    Untyped,
}

impl MetricKind {
    /// Lowercase name as it appears in a `# TYPE` directive and in the
    /// `Type` event payload key.
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
            MetricKind::Untyped => "untyped",
        }
    }

    pub fn from_str(s: &str) -> Option<MetricKind> {
        match s {
            "counter" => Some(MetricKind::Counter),
            "gauge" => Some(MetricKind::Gauge),
            "histogram" => Some(MetricKind::Histogram),
            "summary" => Some(MetricKind::Summary),
            "untyped" => Some(MetricKind::Untyped),
            _ => None,
        }
    }
}

/// A single `name="value"` label. A metric's labels are kept as an ordered
/// list as parsed; equality for delta-cache keys and sample deduplication is
/// set equality over `(name, value)` pairs, not list order.
pub type LabelPair = (String, String);

/// One histogram bucket: `le="<upper_bound>"` and its cumulative count.
/// Upper bounds are distinct within a single histogram metric.
#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

/// One summary quantile: `quantile="<q>"` and its observed value.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantile {
    pub quantile: f64,
    pub value: f64,
}

/// The payload carried by a `Metric`, selected by the parent family's kind.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    /// Counter, Gauge, or Untyped: a bare scalar. May be `+Inf`, `-Inf`, or `NaN`.
    Scalar(f64),
    Histogram {
        sample_sum: f64,
        sample_count: u64,
        buckets: Vec<Bucket>,
    },
    Summary {
        sample_sum: f64,
        sample_count: u64,
        quantiles: Vec<Quantile>,
    },
}

/// One observation within a family: a label set plus a kind-specific payload.
///
/// `timestamp_ms` is signed to allow pre-epoch samples (spec scenario S3);
/// `0` means "unset", in which case the scrape's capture time is used.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub labels: Vec<LabelPair>,
    pub timestamp_ms: i64,
    pub value: MetricValue,
}

impl Metric {
    /// Set equality over `(name, value)` pairs, ignoring wire order.
    /// Used both by the parser's sample-merge search and by the delta cache.
    pub fn labels_match(&self, other: &[LabelPair]) -> bool {
        if self.labels.len() != other.len() {
            return false;
        }
        self.labels
            .iter()
            .all(|pair| other.iter().any(|o| o == pair))
    }

    pub fn label_value(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A named, typed group of metrics sharing help text, as produced by one
/// parse of an exposition. Name uniqueness and the `_sum`/`_count`/`_bucket`
/// suffix-association rules are enforced by the parser, not by this type.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub kind: MetricKind,
    pub help: String,
    pub metrics: Vec<Metric>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        MetricFamily {
            name: name.into(),
            kind,
            help: String::new(),
            metrics: Vec::new(),
        }
    }
}
