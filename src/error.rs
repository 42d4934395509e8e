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

use thiserror::Error;

/// A single fatal parse error, tagged with the 1-based line number at which
/// it occurred. The parser never returns a partial result alongside one of
/// these: once it fails, the whole exposition is discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {line})")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

/// Malformed configuration. The input that owns a bad config becomes inert
/// (no scrape tasks started) rather than panicking or retrying.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no scrape targets configured")]
    EmptyUrls,
    #[error("invalid scrape target url {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Failures from one scrape cycle. Transport and parse failures abandon the
/// current cycle's payload entirely; the per-URL loop resumes at the next
/// interval.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("unsupported response media type: {content_type}")]
    UnsupportedMediaType { content_type: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
}
