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

//! Scrapes Prometheus text-exposition endpoints on a fixed interval,
//! reassembles histogram and summary samples, diffs cumulative counters
//! against the previous scrape, and publishes the result as normalized
//! events to any number of subscribers.
//!
//! The pipeline is a straight line from wire text to published event:
//! [`reader`] and [`parser`] turn an HTTP response body into [`model`]
//! types, [`delta`] turns two scrapes of the same series into a signed
//! delta, [`events`] turns a family into publishable [`Event`](events::Event)s,
//! and [`subject`] fans those out. [`scrape`] wires a [`config::Config`]'s
//! targets to one independent loop per URL.

pub mod config;
pub mod delta;
pub mod error;
pub mod events;
pub mod health;
pub mod http;
pub mod model;
pub mod parser;
pub mod protobuf;
pub mod reader;
pub mod scrape;
pub mod subject;

pub use config::Config;
pub use error::{ConfigError, ParseError, ScrapeError};
pub use events::Event;
pub use scrape::{ScrapeComponents, ScrapeEngine};
