//! Tokio codec for the card feed wire format.
//!
//! The feed publishes one JSON object per newline-terminated frame:
//!
//! ```text
//! {"card_id":"AB12","totem_id":"T1"}\n
//! {"card_id":"CD34"}\n
//! ```
//!
//! # Malformed-frame tolerance
//!
//! A hardware bridge occasionally emits garbage (truncated JSON, stray
//! bytes). The subscription must survive that, so a frame that fails UTF-8
//! or JSON decoding yields [`TapFrame::Malformed`] as an *item* rather than
//! a stream error: the consumer logs and drops it, and the next frame
//! decodes normally. Only transport-level problems (oversized frame, I/O
//! failure) surface as errors and tear the connection down.
//!
//! # DoS protection
//!
//! Frames larger than the configured ceiling (default 64 KB) are rejected
//! with [`Error::FrameTooLarge`] so a misbehaving publisher cannot grow the
//! decode buffer without bound.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use tapgate_core::{Error, constants::MAX_FRAME_SIZE};

/// Raw feed payload as published by the reader bridge.
///
/// `card_id` is required; `totem_id` is absent when the bridge does not
/// know which reader originated the tap. Validation into the broker's
/// newtypes happens in the ingress loop, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapPayload {
    /// Opaque card identifier string.
    pub card_id: String,

    /// Originating reader identifier, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totem_id: Option<String>,
}

/// One decoded feed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapFrame {
    /// A well-formed tap payload.
    Tap(TapPayload),

    /// A frame that could not be parsed. Log and drop; never fatal.
    Malformed {
        /// Human-readable parse failure description.
        reason: String,
    },
}

/// Newline-delimited JSON codec for the card feed.
#[derive(Debug)]
pub struct TapCodec {
    /// Maximum allowed frame size in bytes.
    max_frame_size: usize,
}

impl TapCodec {
    /// Create a codec with the default 64 KB frame ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom frame ceiling.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    fn parse_line(line: &[u8]) -> TapFrame {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(e) => {
                return TapFrame::Malformed {
                    reason: format!("invalid UTF-8: {e}"),
                };
            }
        };
        match serde_json::from_str::<TapPayload>(text) {
            Ok(payload) => TapFrame::Tap(payload),
            Err(e) => TapFrame::Malformed {
                reason: format!("invalid JSON: {e}"),
            },
        }
    }
}

impl Default for TapCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TapCodec {
    type Item = TapFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TapFrame>, Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_frame_size {
                    return Err(Error::FrameTooLarge {
                        max_bytes: self.max_frame_size,
                    });
                }
                return Ok(None);
            };

            if pos > self.max_frame_size {
                return Err(Error::FrameTooLarge {
                    max_bytes: self.max_frame_size,
                });
            }

            let line = src.split_to(pos + 1);
            // Strip the newline and an optional preceding CR
            let mut end = line.len() - 1;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }
            let line = &line[..end];

            // Blank keep-alive lines between frames are skipped
            if line.is_empty() {
                continue;
            }

            return Ok(Some(Self::parse_line(line)));
        }
    }
}

impl Encoder<TapPayload> for TapCodec {
    type Error = Error;

    fn encode(&mut self, payload: TapPayload, dst: &mut BytesMut) -> Result<(), Error> {
        let json = serde_json::to_string(&payload).map_err(|e| Error::MalformedPayload {
            reason: e.to_string(),
        })?;
        dst.reserve(json.len() + 1);
        dst.put_slice(json.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
