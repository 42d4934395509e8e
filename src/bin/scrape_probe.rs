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

//! Minimal demo binary: scrapes the given targets and prints every
//! published event to stdout until interrupted.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use promscrape::config::Config;
use promscrape::health::LoggingHealthReporter;
use promscrape::http::Hyper1Fetcher;
use promscrape::protobuf::UnsupportedProtobufDecoder;
use promscrape::scrape::{ScrapeComponents, ScrapeEngine};
use promscrape::subject::{BroadcastSubject, Subject};

#[derive(Parser, Debug)]
#[command(about = "Scrape Prometheus exposition endpoints and print published events")]
struct Args {
    /// URL to scrape. May be repeated.
    #[arg(long = "url", required = true)]
    urls: Vec<String>,

    #[arg(long = "interval-ms", default_value_t = 5_000)]
    interval_ms: u64,

    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

// Current-thread runtime, matching the teacher's own binaries (`prom2sqlite`,
// `prom2parquet`), which build a `runtime::Builder::new_current_thread()` by
// hand rather than pulling in `rt-multi-thread`.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level)).init();

    let mut config = Config::new(args.urls);
    config.scrape_interval = Duration::from_millis(args.interval_ms);

    let subject = Arc::new(BroadcastSubject::new(config.subscriber_buffer));
    let mut subscription = subject.subscribe();

    let components = ScrapeComponents {
        fetcher: Arc::new(Hyper1Fetcher::new()),
        decoder: Arc::new(UnsupportedProtobufDecoder),
        subject: subject.clone(),
        health: Arc::new(LoggingHealthReporter),
    };

    let engine = match ScrapeEngine::start(config, components) {
        Ok(engine) => engine,
        Err(err) => {
            log::error!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        _ = async {
            while let Some(event) = subscription.recv().await {
                println!("{event:?}");
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down");
        }
    }

    engine.shutdown().await;
    ExitCode::SUCCESS
}
