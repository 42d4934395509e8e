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

//! Seam for the protobuf-delimited exposition format
//! (`application/vnd.google.protobuf`). No decoder ships with this crate —
//! `UnsupportedProtobufDecoder` fails honestly rather than silently
//! downgrading a target's response. A real decoder can be plugged in
//! wherever a `ScrapeEngine` is built.

use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::model::MetricFamily;

#[async_trait]
pub trait DelimitedProtobufDecoder: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<Vec<MetricFamily>, ScrapeError>;
}

/// The default decoder. Every scrape target this crate is pointed at is
/// expected to speak the text format; a target that negotiates protobuf
/// instead fails the cycle with `UnsupportedMediaType` rather than being
/// silently skipped.
#[derive(Default)]
pub struct UnsupportedProtobufDecoder;

#[async_trait]
impl DelimitedProtobufDecoder for UnsupportedProtobufDecoder {
    fn decode(&self, _body: &[u8]) -> Result<Vec<MetricFamily>, ScrapeError> {
        Err(ScrapeError::UnsupportedMediaType {
            content_type: "application/vnd.google.protobuf".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_decoder_always_fails() {
        let decoder = UnsupportedProtobufDecoder;
        let err = decoder.decode(&[]).unwrap_err();
        assert!(matches!(err, ScrapeError::UnsupportedMediaType { .. }));
    }
}
