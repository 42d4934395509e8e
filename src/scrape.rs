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

//! Wires a `Config`'s targets to independent scrape loops, one `tokio` task
//! per URL, all sharing a `DeltaCache` and publishing onto a common
//! `Subject`. Cycles never overlap: each loop waits for its own fetch,
//! parse, and publish step to finish before the next tick fires.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::delta::DeltaCache;
use crate::error::ScrapeError;
use crate::events::build_events;
use crate::health::HealthReporter;
use crate::http::{HttpFetcher, ACCEPT_TEXT_FORMAT};
use crate::parser::parse_text;
use crate::protobuf::DelimitedProtobufDecoder;
use crate::subject::Subject;

/// Everything a scrape loop needs that isn't per-URL state. Bundled so
/// `ScrapeEngine::start` doesn't have to take five separate `Arc`s.
pub struct ScrapeComponents {
    pub fetcher: Arc<dyn HttpFetcher>,
    pub decoder: Arc<dyn DelimitedProtobufDecoder>,
    pub subject: Arc<dyn Subject>,
    pub health: Arc<dyn HealthReporter>,
}

async fn run_one_cycle(
    url: &str,
    components: &ScrapeComponents,
    cache: &DeltaCache,
) -> Result<usize, ScrapeError> {
    // Captured before the GET, not after the response arrives: this is the
    // fallback sample timestamp for every sample the scrape produces that
    // carries none of its own, per spec's "record request_time = now"
    // step — the engine's own clock, not anything read off the target's
    // response.
    let request_time = Utc::now();
    let response = components.fetcher.fetch(url).await?;
    // Per the exposition format's content negotiation: protobuf-delimited
    // if the target offers it, the text format for anything else (not just
    // `text/plain` — an absent or unrecognized media type still means text,
    // matching how every target that doesn't speak protobuf actually replies).
    let families = if response.content_type.contains("application/vnd.google.protobuf") {
        components.decoder.decode(response.body.as_bytes())?
    } else {
        parse_text(&response.body)?
    };
    let family_count = families.len();
    for family in &families {
        for event in build_events(url, family, request_time, cache) {
            components.subject.publish(event);
        }
    }
    Ok(family_count)
}

async fn scrape_loop(
    url: String,
    interval: Duration,
    components: Arc<ScrapeComponents>,
    cache: Arc<DeltaCache>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_one_cycle(&url, &components, &cache).await {
                    Ok(family_count) => components.health.scrape_succeeded(&url, family_count),
                    Err(err) => components.health.scrape_failed(&url, &err),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Owns the running scrape tasks. Dropping this without calling
/// `shutdown` leaves the tasks running detached; `shutdown` is the
/// intended way to stop them.
pub struct ScrapeEngine {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    components: Arc<ScrapeComponents>,
    cache: Arc<DeltaCache>,
}

impl ScrapeEngine {
    /// Validate `config` and start one independent loop per URL. Returns
    /// the validation error instead of starting anything if the config is
    /// malformed.
    pub fn start(config: Config, components: ScrapeComponents) -> Result<Self, crate::error::ConfigError> {
        config.validate()?;
        let components = Arc::new(components);
        let cache = Arc::new(DeltaCache::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = config
            .urls
            .iter()
            .map(|url| {
                tokio::spawn(scrape_loop(
                    url.clone(),
                    config.scrape_interval,
                    Arc::clone(&components),
                    Arc::clone(&cache),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        Ok(ScrapeEngine {
            shutdown_tx,
            tasks,
            components,
            cache,
        })
    }

    /// Signal every loop to stop after its current cycle, wait for them all
    /// to exit, then close the subject and drop the shared delta cache.
    /// Idempotent: the subject's own `close()` tolerates being called more
    /// than once, and a second `shutdown()` call just waits on already-
    /// finished tasks.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        self.components.subject.close();
        drop(self.cache);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::health::LoggingHealthReporter;
    use crate::http::FetchResponse;
    use crate::protobuf::UnsupportedProtobufDecoder;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticFetcher {
        body: String,
    }

    #[async_trait]
    impl HttpFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchResponse, ScrapeError> {
            Ok(FetchResponse {
                content_type: ACCEPT_TEXT_FORMAT.to_string(),
                body: self.body.clone(),
            })
        }
    }

    struct RecordingSubject {
        events: Mutex<Vec<Event>>,
    }

    impl Subject for RecordingSubject {
        fn publish(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn subscribe(&self) -> crate::subject::Subscription {
            unimplemented!("not exercised by these tests")
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn one_cycle_publishes_events_for_counters() {
        let components = ScrapeComponents {
            fetcher: Arc::new(StaticFetcher {
                body: "# TYPE c counter\nc 1\n".to_string(),
            }),
            decoder: Arc::new(UnsupportedProtobufDecoder),
            subject: Arc::new(RecordingSubject {
                events: Mutex::new(Vec::new()),
            }),
            health: Arc::new(LoggingHealthReporter),
        };
        let cache = DeltaCache::new();
        let family_count = run_one_cycle("http://x", &components, &cache).await.unwrap();
        assert_eq!(family_count, 1);
    }

    #[tokio::test]
    async fn protobuf_content_type_is_reported_as_unsupported() {
        struct ProtobufFetcher;
        #[async_trait]
        impl HttpFetcher for ProtobufFetcher {
            async fn fetch(&self, _url: &str) -> Result<FetchResponse, ScrapeError> {
                Ok(FetchResponse {
                    content_type: "application/vnd.google.protobuf;proto=io.prometheus.client.MetricFamily;encoding=delimited".to_string(),
                    body: String::new(),
                })
            }
        }
        let components = ScrapeComponents {
            fetcher: Arc::new(ProtobufFetcher),
            decoder: Arc::new(UnsupportedProtobufDecoder),
            subject: Arc::new(RecordingSubject {
                events: Mutex::new(Vec::new()),
            }),
            health: Arc::new(LoggingHealthReporter),
        };
        let cache = DeltaCache::new();
        let err = run_one_cycle("http://x", &components, &cache).await.unwrap_err();
        assert!(matches!(err, ScrapeError::UnsupportedMediaType { .. }));
    }

    #[tokio::test]
    async fn unrecognized_content_type_still_falls_back_to_text_parsing() {
        struct UnknownMediaFetcher;
        #[async_trait]
        impl HttpFetcher for UnknownMediaFetcher {
            async fn fetch(&self, _url: &str) -> Result<FetchResponse, ScrapeError> {
                Ok(FetchResponse {
                    content_type: "application/octet-stream".to_string(),
                    body: "# TYPE c counter\nc 1\n".to_string(),
                })
            }
        }
        let components = ScrapeComponents {
            fetcher: Arc::new(UnknownMediaFetcher),
            decoder: Arc::new(UnsupportedProtobufDecoder),
            subject: Arc::new(RecordingSubject {
                events: Mutex::new(Vec::new()),
            }),
            health: Arc::new(LoggingHealthReporter),
        };
        let cache = DeltaCache::new();
        let family_count = run_one_cycle("http://x", &components, &cache).await.unwrap();
        assert_eq!(family_count, 1);
    }
}
