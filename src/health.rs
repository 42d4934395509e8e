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

//! Reports the outcome of each scrape cycle. There is no metrics endpoint
//! of its own here (that would be a consumer's concern); a `HealthReporter`
//! is just the seam a `ScrapeEngine` calls into so cycle outcomes are
//! observable without requiring a subscriber to infer them from the
//! absence of events.

use crate::error::ScrapeError;

pub trait HealthReporter: Send + Sync {
    fn scrape_succeeded(&self, url: &str, family_count: usize);
    fn scrape_failed(&self, url: &str, error: &ScrapeError);
}

/// Default reporter: logs at `info` on success and `error` on failure,
/// the same level split the teacher's driver loop uses around its own
/// fetch/export calls.
#[derive(Default)]
pub struct LoggingHealthReporter;

impl HealthReporter for LoggingHealthReporter {
    fn scrape_succeeded(&self, url: &str, family_count: usize) {
        log::info!("scraped {url}: {family_count} metric families");
    }

    fn scrape_failed(&self, url: &str, error: &ScrapeError) {
        log::error!("scrape of {url} failed: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_reporter_does_not_panic_on_either_path() {
        let reporter = LoggingHealthReporter;
        reporter.scrape_succeeded("http://x", 3);
        reporter.scrape_failed(
            "http://x",
            &ScrapeError::UnsupportedMediaType {
                content_type: "application/vnd.google.protobuf".to_string(),
            },
        );
    }
}
