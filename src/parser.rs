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

//! A hand-rolled, single-pass, recursive-descent parser for the Prometheus
//! text exposition format (v0.0.4). Reassembles `_sum`, `_count`, and
//! `_bucket` lines into their parent histogram/summary family, dedupes
//! label sets, and fails fast with a 1-based line number on the first
//! syntactic violation. The parser is single-shot: once `parse_text`
//! returns, it does not retain state to be fed more input.

use std::collections::HashMap;

use crate::error::ParseError;
use crate::model::{Bucket, LabelPair, Metric, MetricFamily, MetricKind, MetricValue, Quantile};
use crate::reader::CharReader;

/// Which line-suffix a sample's raw name resolved through, i.e. how its
/// value should be dispatched once the parent family is known. `Exact`
/// covers both "ordinary scalar sample" and "summary quantile sample" —
/// the two are told apart by the parent family's kind at dispatch time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SuffixKind {
    Exact,
    Sum,
    Count,
    Bucket,
}

/// Strip `suffix` from `name`, but only if at least one character of `name`
/// precedes it. The suffix alone is never enough — this is the off-by-one
/// behavior the exposition format relies on to avoid treating a literal
/// metric named `_count` as a dangling aggregate of nothing.
fn strip_suffix_with_prefix<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if name.len() > suffix.len() && name.ends_with(suffix) {
        Some(&name[..name.len() - suffix.len()])
    } else {
        None
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn is_label_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_label_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_line_ws(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\n'
}

fn expect_newline(r: &mut CharReader, line: usize) -> Result<(), ParseError> {
    r.skip_blanks();
    match r.read() {
        Some('\n') => Ok(()),
        Some(c) => Err(ParseError::new(
            line,
            format!("unexpected character {:?} before end of line", c),
        )),
        None => Err(ParseError::new(line, "missing trailing newline")),
    }
}

fn parse_name(r: &mut CharReader, line: usize, allow_brace_terminator: bool) -> Result<String, ParseError> {
    match r.peek() {
        Some(c) if is_name_start(c) => {}
        Some(c) => {
            return Err(ParseError::new(
                line,
                format!("invalid first character {:?} in name", c),
            ))
        }
        None => return Err(ParseError::new(line, "expected a name")),
    }
    let mut name = String::new();
    loop {
        match r.peek() {
            Some(c) if is_name_continue(c) => {
                name.push(c);
                r.read();
            }
            Some('{') if allow_brace_terminator => break,
            Some(c) if is_line_ws(c) => break,
            None => break,
            Some(c) => {
                return Err(ParseError::new(
                    line,
                    format!("invalid character {:?} in name", c),
                ))
            }
        }
    }
    Ok(name)
}

fn parse_label_name(r: &mut CharReader, line: usize) -> Result<String, ParseError> {
    match r.peek() {
        Some(c) if is_label_start(c) => {}
        _ => return Err(ParseError::new(line, "empty or invalid label name")),
    }
    let mut name = String::new();
    while let Some(c) = r.peek() {
        if is_label_continue(c) {
            name.push(c);
            r.read();
        } else {
            break;
        }
    }
    Ok(name)
}

fn parse_label_value(r: &mut CharReader, line: usize) -> Result<String, ParseError> {
    if r.read() != Some('"') {
        return Err(ParseError::new(line, "missing opening quote in label value"));
    }
    let mut value = String::new();
    loop {
        match r.read() {
            None => return Err(ParseError::new(line, "missing closing quote in label value")),
            Some('"') => break,
            Some('\\') => match r.read() {
                Some('\\') => value.push('\\'),
                Some('"') => value.push('"'),
                Some('n') => value.push('\n'),
                Some(other) => {
                    return Err(ParseError::new(
                        line,
                        format!("invalid escape \\{} in label value", other),
                    ))
                }
                None => return Err(ParseError::new(line, "unterminated escape in label value")),
            },
            Some(c) => value.push(c),
        }
    }
    Ok(value)
}

fn parse_label_block(r: &mut CharReader, line: usize) -> Result<Vec<LabelPair>, ParseError> {
    r.read(); // consume '{'
    let mut labels = Vec::new();
    r.skip_blanks();
    if r.peek() == Some('}') {
        r.read();
        return Ok(labels);
    }
    loop {
        r.skip_blanks();
        let name = parse_label_name(r, line)?;
        r.skip_blanks();
        if r.read() != Some('=') {
            return Err(ParseError::new(line, "expected '=' in label block"));
        }
        r.skip_blanks();
        let value = parse_label_value(r, line)?;
        labels.push((name, value));
        r.skip_blanks();
        match r.read() {
            Some(',') => continue,
            Some('}') => break,
            Some(c) => {
                return Err(ParseError::new(
                    line,
                    format!("expected ',' or '}}' in label block, found {:?}", c),
                ))
            }
            None => return Err(ParseError::new(line, "unterminated label block")),
        }
    }
    Ok(labels)
}

fn parse_help_text(r: &mut CharReader, line: usize) -> Result<String, ParseError> {
    let mut text = String::new();
    loop {
        match r.peek() {
            None | Some('\n') => break,
            Some('\\') => {
                r.read();
                match r.read() {
                    Some('\\') => text.push('\\'),
                    Some('n') => text.push('\n'),
                    Some(other) => {
                        return Err(ParseError::new(
                            line,
                            format!("invalid escape \\{} in help text", other),
                        ))
                    }
                    None => return Err(ParseError::new(line, "unterminated escape in help text")),
                }
            }
            Some(c) => {
                text.push(c);
                r.read();
            }
        }
    }
    Ok(text)
}

fn parse_value_token(r: &mut CharReader, line: usize) -> Result<f64, ParseError> {
    r.skip_blanks();
    let tok = r.read_until(is_line_ws);
    match tok.as_str() {
        "+Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        // Exactly this spelling is accepted; `NaN`/`nan` are not. Preserved
        // from the source this format was distilled from.
        "Nan" => Ok(f64::NAN),
        _ => tok
            .parse::<f64>()
            .map_err(|_| ParseError::new(line, format!("invalid value {:?}", tok))),
    }
}

fn parse_optional_timestamp(r: &mut CharReader, line: usize) -> Result<Option<i64>, ParseError> {
    r.skip_blanks();
    match r.peek() {
        None | Some('\n') => Ok(None),
        _ => {
            let tok = r.read_until(is_line_ws);
            tok.parse::<i64>()
                .map(Some)
                .map_err(|_| ParseError::new(line, format!("invalid timestamp {:?}", tok)))
        }
    }
}

fn parse_le_value(s: &str, line: usize) -> Result<f64, ParseError> {
    if s == "+Inf" {
        Ok(f64::INFINITY)
    } else {
        s.parse::<f64>()
            .map_err(|_| ParseError::new(line, format!("invalid le value {:?}", s)))
    }
}

fn extract_reserved_label(
    mut labels: Vec<LabelPair>,
    reserved: &str,
    line: usize,
) -> Result<(String, Vec<LabelPair>), ParseError> {
    match labels.iter().position(|(name, _)| name == reserved) {
        Some(pos) => {
            let (_, value) = labels.remove(pos);
            Ok((value, labels))
        }
        None => Err(ParseError::new(
            line,
            format!("sample is missing required label {:?}", reserved),
        )),
    }
}

/// Builder state for one call to `parse_text`: the families seen so far, in
/// first-seen order, plus a name index for O(1) lookup.
struct ParserState {
    families: Vec<MetricFamily>,
    index: HashMap<String, usize>,
}

impl ParserState {
    fn new() -> Self {
        ParserState {
            families: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn insert_family(&mut self, family: MetricFamily) -> usize {
        let idx = self.families.len();
        self.index.insert(family.name.clone(), idx);
        self.families.push(family);
        idx
    }

    fn get_or_create_family(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            idx
        } else {
            self.insert_family(MetricFamily::new(name, MetricKind::Untyped))
        }
    }

    fn parse_directive_or_comment(&mut self, r: &mut CharReader, line: usize) -> Result<(), ParseError> {
        r.skip_blanks();
        let keyword = r.read_until(is_line_ws);
        match keyword.as_str() {
            "HELP" => self.parse_help(r, line),
            "TYPE" => self.parse_type(r, line),
            _ => {
                r.read_until(|c| c == '\n');
                expect_newline(r, line)
            }
        }
    }

    fn parse_help(&mut self, r: &mut CharReader, line: usize) -> Result<(), ParseError> {
        r.skip_blanks();
        let name = parse_name(r, line, false)?;
        r.skip_blanks();
        let text = parse_help_text(r, line)?;
        expect_newline(r, line)?;
        let idx = self.get_or_create_family(&name);
        self.families[idx].help = text;
        Ok(())
    }

    fn parse_type(&mut self, r: &mut CharReader, line: usize) -> Result<(), ParseError> {
        r.skip_blanks();
        let name = parse_name(r, line, false)?;
        r.skip_blanks();
        let kind_str = r.read_until(is_line_ws);
        let kind = MetricKind::from_str(&kind_str)
            .ok_or_else(|| ParseError::new(line, format!("unknown metric kind {:?}", kind_str)))?;
        expect_newline(r, line)?;
        match self.index.get(&name).copied() {
            Some(idx) => {
                if !self.families[idx].metrics.is_empty() {
                    return Err(ParseError::new(
                        line,
                        format!("TYPE directive for {:?} follows samples already recorded", name),
                    ));
                }
                self.families[idx].kind = kind;
            }
            None => {
                self.insert_family(MetricFamily::new(name, kind));
            }
        }
        Ok(())
    }

    /// Implements the family-association algorithm of spec §4.2: exact
    /// name match first, then `_count`/`_sum`/`_bucket` suffix stripping
    /// against an existing Histogram/Summary parent, else a fresh Untyped
    /// family under the raw (unstripped) name.
    fn resolve_family_for_sample(&mut self, raw_name: &str) -> (usize, SuffixKind) {
        if let Some(&idx) = self.index.get(raw_name) {
            return (idx, SuffixKind::Exact);
        }
        if let Some(prefix) = strip_suffix_with_prefix(raw_name, "_count") {
            if let Some(&idx) = self.index.get(prefix) {
                if matches!(self.families[idx].kind, MetricKind::Summary | MetricKind::Histogram) {
                    return (idx, SuffixKind::Count);
                }
            }
        }
        if let Some(prefix) = strip_suffix_with_prefix(raw_name, "_sum") {
            if let Some(&idx) = self.index.get(prefix) {
                if matches!(self.families[idx].kind, MetricKind::Summary | MetricKind::Histogram) {
                    return (idx, SuffixKind::Sum);
                }
            }
        }
        if let Some(prefix) = strip_suffix_with_prefix(raw_name, "_bucket") {
            if let Some(&idx) = self.index.get(prefix) {
                if self.families[idx].kind == MetricKind::Histogram {
                    return (idx, SuffixKind::Bucket);
                }
            }
        }
        let idx = self.insert_family(MetricFamily::new(raw_name, MetricKind::Untyped));
        (idx, SuffixKind::Exact)
    }

    fn find_or_create_metric(
        family_idx: usize,
        families: &mut [MetricFamily],
        labels: &[LabelPair],
        timestamp_ms: i64,
        default_value: impl FnOnce() -> MetricValue,
    ) -> usize {
        let family = &mut families[family_idx];
        if let Some(pos) = family.metrics.iter().position(|m| m.labels_match(labels)) {
            return pos;
        }
        family.metrics.push(Metric {
            labels: labels.to_vec(),
            timestamp_ms,
            value: default_value(),
        });
        family.metrics.len() - 1
    }

    fn parse_sample_line(&mut self, r: &mut CharReader) -> Result<(), ParseError> {
        let line = r.line();
        let raw_name = parse_name(r, line, true)?;
        let raw_labels = if r.peek() == Some('{') {
            parse_label_block(r, line)?
        } else {
            Vec::new()
        };
        let value = parse_value_token(r, line)?;
        let timestamp = parse_optional_timestamp(r, line)?;
        expect_newline(r, line)?;

        let (family_idx, suffix_kind) = self.resolve_family_for_sample(&raw_name);
        self.merge_sample(family_idx, suffix_kind, raw_labels, value, timestamp, line)
    }

    fn merge_sample(
        &mut self,
        family_idx: usize,
        suffix_kind: SuffixKind,
        raw_labels: Vec<LabelPair>,
        value: f64,
        timestamp: Option<i64>,
        line: usize,
    ) -> Result<(), ParseError> {
        let timestamp_ms = timestamp.unwrap_or(0);
        let kind = self.families[family_idx].kind;
        match kind {
            MetricKind::Counter | MetricKind::Gauge | MetricKind::Untyped => {
                let family = &mut self.families[family_idx];
                if family.metrics.iter().any(|m| m.labels_match(&raw_labels)) {
                    return Err(ParseError::new(
                        line,
                        format!("duplicate label set for metric {:?}", family.name),
                    ));
                }
                family.metrics.push(Metric {
                    labels: raw_labels,
                    timestamp_ms,
                    value: MetricValue::Scalar(value),
                });
                Ok(())
            }
            MetricKind::Histogram => match suffix_kind {
                SuffixKind::Bucket => {
                    let (le_str, labels) = extract_reserved_label(raw_labels, "le", line)?;
                    let upper_bound = parse_le_value(&le_str, line)?;
                    let idx = Self::find_or_create_metric(
                        family_idx,
                        &mut self.families,
                        &labels,
                        timestamp_ms,
                        || MetricValue::Histogram {
                            sample_sum: 0.0,
                            sample_count: 0,
                            buckets: Vec::new(),
                        },
                    );
                    match &mut self.families[family_idx].metrics[idx].value {
                        MetricValue::Histogram { buckets, .. } => buckets.push(Bucket {
                            upper_bound,
                            cumulative_count: value as u64,
                        }),
                        _ => unreachable!("histogram family metric always holds Histogram payload"),
                    }
                    Ok(())
                }
                SuffixKind::Sum => {
                    let idx = Self::find_or_create_metric(
                        family_idx,
                        &mut self.families,
                        &raw_labels,
                        timestamp_ms,
                        || MetricValue::Histogram {
                            sample_sum: 0.0,
                            sample_count: 0,
                            buckets: Vec::new(),
                        },
                    );
                    match &mut self.families[family_idx].metrics[idx].value {
                        MetricValue::Histogram { sample_sum, .. } => *sample_sum = value,
                        _ => unreachable!(),
                    }
                    Ok(())
                }
                SuffixKind::Count => {
                    let idx = Self::find_or_create_metric(
                        family_idx,
                        &mut self.families,
                        &raw_labels,
                        timestamp_ms,
                        || MetricValue::Histogram {
                            sample_sum: 0.0,
                            sample_count: 0,
                            buckets: Vec::new(),
                        },
                    );
                    match &mut self.families[family_idx].metrics[idx].value {
                        MetricValue::Histogram { sample_count, .. } => *sample_count = value as u64,
                        _ => unreachable!(),
                    }
                    Ok(())
                }
                SuffixKind::Exact => Err(ParseError::new(
                    line,
                    format!(
                        "histogram sample for {:?} is missing a _sum/_count/_bucket suffix",
                        self.families[family_idx].name
                    ),
                )),
            },
            MetricKind::Summary => match suffix_kind {
                SuffixKind::Exact => {
                    let (q_str, labels) = extract_reserved_label(raw_labels, "quantile", line)?;
                    let quantile = q_str
                        .parse::<f64>()
                        .map_err(|_| ParseError::new(line, format!("invalid quantile {:?}", q_str)))?;
                    let idx = Self::find_or_create_metric(
                        family_idx,
                        &mut self.families,
                        &labels,
                        timestamp_ms,
                        || MetricValue::Summary {
                            sample_sum: 0.0,
                            sample_count: 0,
                            quantiles: Vec::new(),
                        },
                    );
                    match &mut self.families[family_idx].metrics[idx].value {
                        MetricValue::Summary { quantiles, .. } => {
                            quantiles.push(Quantile { quantile, value })
                        }
                        _ => unreachable!(),
                    }
                    Ok(())
                }
                SuffixKind::Sum => {
                    let idx = Self::find_or_create_metric(
                        family_idx,
                        &mut self.families,
                        &raw_labels,
                        timestamp_ms,
                        || MetricValue::Summary {
                            sample_sum: 0.0,
                            sample_count: 0,
                            quantiles: Vec::new(),
                        },
                    );
                    match &mut self.families[family_idx].metrics[idx].value {
                        MetricValue::Summary { sample_sum, .. } => *sample_sum = value,
                        _ => unreachable!(),
                    }
                    Ok(())
                }
                SuffixKind::Count => {
                    let idx = Self::find_or_create_metric(
                        family_idx,
                        &mut self.families,
                        &raw_labels,
                        timestamp_ms,
                        || MetricValue::Summary {
                            sample_sum: 0.0,
                            sample_count: 0,
                            quantiles: Vec::new(),
                        },
                    );
                    match &mut self.families[family_idx].metrics[idx].value {
                        MetricValue::Summary { sample_count, .. } => *sample_count = value as u64,
                        _ => unreachable!(),
                    }
                    Ok(())
                }
                SuffixKind::Bucket => unreachable!("resolve_family_for_sample never returns Bucket for a Summary family"),
            },
        }
    }
}

/// Parse a full Prometheus text exposition into its metric families, in
/// first-seen order. Fails at the first syntactic violation with the
/// 1-based line number it occurred on; there is no partial result.
pub fn parse_text(input: &str) -> Result<Vec<MetricFamily>, ParseError> {
    let mut state = ParserState::new();
    let mut r = CharReader::new(input);
    loop {
        r.skip_blanks();
        match r.peek() {
            None => break,
            Some('\n') => {
                r.read();
            }
            Some('#') => {
                let line = r.line();
                r.read();
                state.parse_directive_or_comment(&mut r, line)?;
            }
            Some(_) => state.parse_sample_line(&mut r)?,
        }
    }
    Ok(state.families)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric<'a>(family: &'a MetricFamily, labels: &[(&str, &str)]) -> &'a Metric {
        family
            .metrics
            .iter()
            .find(|m| {
                m.labels.len() == labels.len()
                    && labels
                        .iter()
                        .all(|(n, v)| m.labels.iter().any(|(mn, mv)| mn == n && mv == v))
            })
            .expect("metric with matching labels not found")
    }

    #[test]
    fn s1_counter_with_labels_and_timestamp() {
        let input = "# HELP http_requests_total The total number of HTTP requests.\n\
# TYPE http_requests_total counter\n\
http_requests_total{method=\"post\",code=\"200\"} 1027 1395066363000\n\
http_requests_total{method=\"post\",code=\"400\"} 3 1395066363000\n";
        let families = parse_text(input).unwrap();
        assert_eq!(families.len(), 1);
        let f = &families[0];
        assert_eq!(f.name, "http_requests_total");
        assert_eq!(f.kind, MetricKind::Counter);
        assert!(f.help.starts_with("The total number"));
        assert_eq!(f.metrics.len(), 2);
        let m = metric(f, &[("method", "post"), ("code", "200")]);
        assert_eq!(m.value, MetricValue::Scalar(1027.0));
        assert_eq!(m.timestamp_ms, 1395066363000);
        let m = metric(f, &[("method", "post"), ("code", "400")]);
        assert_eq!(m.value, MetricValue::Scalar(3.0));
    }

    #[test]
    fn s2_escaped_label_values_on_untyped_family() {
        let input = "msdos_file_access_time_seconds{path=\"C:\\\\DIR\\\\FILE.TXT\",error=\"Cannot find file:\\n\\\"FILE.TXT\\\"\"} 1.458255915e9\n";
        let families = parse_text(input).unwrap();
        assert_eq!(families.len(), 1);
        let f = &families[0];
        assert_eq!(f.kind, MetricKind::Untyped);
        assert_eq!(f.metrics.len(), 1);
        let m = &f.metrics[0];
        assert_eq!(m.label_value("path"), Some(r"C:\DIR\FILE.TXT"));
        assert_eq!(m.label_value("error"), Some("Cannot find file:\n\"FILE.TXT\""));
        assert_eq!(m.value, MetricValue::Scalar(1.458255915e9));
    }

    #[test]
    fn s3_weird_timestamp_and_infinity() {
        let input = "something_weird{problem=\"division by zero\"} +Inf -3982045\n";
        let families = parse_text(input).unwrap();
        let f = &families[0];
        assert_eq!(f.kind, MetricKind::Untyped);
        let m = &f.metrics[0];
        assert_eq!(m.value, MetricValue::Scalar(f64::INFINITY));
        assert_eq!(m.timestamp_ms, -3982045);
    }

    #[test]
    fn s4_histogram_assembly() {
        let input = "# TYPE http_request_duration_seconds histogram\n\
http_request_duration_seconds_bucket{le=\"0.05\"} 24054\n\
http_request_duration_seconds_bucket{le=\"0.1\"} 33444\n\
http_request_duration_seconds_bucket{le=\"0.2\"} 100392\n\
http_request_duration_seconds_bucket{le=\"0.5\"} 129389\n\
http_request_duration_seconds_bucket{le=\"1\"} 133988\n\
http_request_duration_seconds_bucket{le=\"+Inf\"} 144320\n\
http_request_duration_seconds_sum 53423\n\
http_request_duration_seconds_count 144320\n";
        let families = parse_text(input).unwrap();
        assert_eq!(families.len(), 1);
        let f = &families[0];
        assert_eq!(f.kind, MetricKind::Histogram);
        assert_eq!(f.metrics.len(), 1);
        match &f.metrics[0].value {
            MetricValue::Histogram {
                sample_sum,
                sample_count,
                buckets,
            } => {
                assert_eq!(*sample_sum, 53423.0);
                assert_eq!(*sample_count, 144320);
                assert_eq!(buckets.len(), 6);
                assert_eq!(buckets[0], Bucket { upper_bound: 0.05, cumulative_count: 24054 });
                assert_eq!(
                    buckets[5],
                    Bucket { upper_bound: f64::INFINITY, cumulative_count: 144320 }
                );
            }
            _ => panic!("expected histogram payload"),
        }
    }

    #[test]
    fn s5_summary_assembly_with_quantile_label() {
        let input = "# TYPE rpc_duration_seconds summary\n\
rpc_duration_seconds{quantile=\"0.01\"} 3102\n\
rpc_duration_seconds{quantile=\"0.05\"} 3272\n\
rpc_duration_seconds{quantile=\"0.5\"} 4773\n\
rpc_duration_seconds{quantile=\"0.9\"} 9001\n\
rpc_duration_seconds{quantile=\"0.99\"} 76656\n\
rpc_duration_seconds_sum 1.7560473e+07\n\
rpc_duration_seconds_count 2693\n";
        let families = parse_text(input).unwrap();
        assert_eq!(families.len(), 1);
        let f = &families[0];
        assert_eq!(f.kind, MetricKind::Summary);
        assert_eq!(f.metrics.len(), 1);
        let m = &f.metrics[0];
        assert!(m.label_value("quantile").is_none());
        match &m.value {
            MetricValue::Summary {
                sample_sum,
                sample_count,
                quantiles,
            } => {
                assert_eq!(*sample_sum, 1.7560473e+07);
                assert_eq!(*sample_count, 2693);
                assert_eq!(quantiles.len(), 5);
                assert_eq!(quantiles[2], Quantile { quantile: 0.5, value: 4773.0 });
            }
            _ => panic!("expected summary payload"),
        }
    }

    #[test]
    fn s7_fatal_error_on_missing_newline() {
        let input = "untyped_metric 1";
        let err = parse_text(input).unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn s7_fatal_error_on_bad_escape() {
        let input = "m{l=\"bad \\q escape\"} 1\n";
        let err = parse_text(input).unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn s7_fatal_error_on_duplicate_label_set() {
        let input = "# TYPE c counter\nc{a=\"1\"} 1\nc{a=\"1\"} 2\n";
        let err = parse_text(input).unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn family_names_are_unique_within_a_parse() {
        let input = "a 1\na 2\n";
        // "a" is Untyped, so the second sample collides on an identical
        // (empty) label set with the first: fatal, not two families.
        assert!(parse_text(input).is_err());
        let families = parse_text("a{x=\"1\"} 1\na{x=\"2\"} 2\n").unwrap();
        assert_eq!(families.len(), 1);
    }

    #[test]
    fn type_directive_after_samples_is_fatal() {
        let input = "untyped_metric 1\n# TYPE untyped_metric counter\n";
        let err = parse_text(input).unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn suffix_alone_does_not_strip() {
        // "_count" with nothing in front of it must not be treated as an
        // aggregate of some zero-length parent name.
        let input = "# TYPE _count histogram\n_count 5\n";
        let families = parse_text(input).unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, "_count");
    }

    #[test]
    fn minimal_line_without_labels_or_timestamp() {
        let families = parse_text("metric_without_timestamp_and_labels 12.47\n").unwrap();
        assert_eq!(families[0].metrics[0].value, MetricValue::Scalar(12.47));
        assert_eq!(families[0].metrics[0].timestamp_ms, 0);
    }

    #[test]
    fn comment_lines_are_skipped() {
        let families = parse_text("# just a comment, not TYPE or HELP\nfoo 1\n").unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, "foo");
    }

    #[test]
    fn nan_spelling_is_exact() {
        let families = parse_text("m Nan\n").unwrap();
        match families[0].metrics[0].value {
            MetricValue::Scalar(v) => assert!(v.is_nan()),
            _ => panic!("expected scalar"),
        }
        // "NaN"/"nan" never hit the special-cased "Nan" atom (the match is
        // exact), but `str::parse::<f64>` happens to accept them
        // case-insensitively too, so the fallback still yields NaN rather
        // than a parse error. The atom and the fallback agree on the
        // result; only the code path taken differs.
        match parse_text("m NaN\n").unwrap()[0].metrics[0].value {
            MetricValue::Scalar(v) => assert!(v.is_nan()),
            _ => panic!("expected scalar"),
        }
        // An unambiguously non-numeric token is still fatal.
        assert!(parse_text("m not_a_number\n").is_err());
    }
}
