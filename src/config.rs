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

//! Scrape engine configuration and its validation.

use std::time::Duration;

use crate::error::ConfigError;

/// One engine's worth of targets and cadence. Each `urls` entry gets its
/// own independent scrape loop; `scrape_interval` applies uniformly to all
/// of them.
#[derive(Clone, Debug)]
pub struct Config {
    pub urls: Vec<String>,
    pub scrape_interval: Duration,
    /// Size of each subscriber's replay buffer on the default `Subject`.
    pub subscriber_buffer: usize,
}

impl Config {
    pub fn new(urls: Vec<String>) -> Self {
        Config {
            urls,
            scrape_interval: Duration::from_millis(5_000),
            subscriber_buffer: 1024,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.urls.is_empty() {
            return Err(ConfigError::EmptyUrls);
        }
        for url in &self.urls {
            let uri: hyper::Uri = url.parse().map_err(|e| ConfigError::InvalidUrl {
                url: url.clone(),
                source: Box::new(e),
            })?;
            if uri.authority().is_none() {
                return Err(ConfigError::InvalidUrl {
                    url: url.clone(),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "missing host",
                    )),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_urls_is_rejected() {
        let config = Config::new(vec![]);
        assert!(matches!(config.validate(), Err(ConfigError::EmptyUrls)));
    }

    #[test]
    fn relative_url_is_rejected() {
        let config = Config::new(vec!["/metrics".to_string()]);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn well_formed_urls_pass() {
        let config = Config::new(vec!["http://localhost:9100/metrics".to_string()]);
        assert!(config.validate().is_ok());
    }
}
