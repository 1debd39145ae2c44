// ── Input events ──
//
// Discrete, timestamped messages from a controller. Transport decoding
// happens outside this crate; a bridge writes one JSON object per line:
//
//   {"port": "nanoKONTROL2 MIDI 1", "type": "control_change", "channel": 0, "control": 14, "value": 100}

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::trace;

use crate::error::InputError;

/// One message from an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Logical port identifier, e.g. the MIDI port name.
    pub port: String,
    #[serde(flatten)]
    pub message: InputMessage,
}

impl InputEvent {
    pub fn new(port: impl Into<String>, message: InputMessage) -> Self {
        Self {
            timestamp: Utc::now(),
            port: port.into(),
            message,
        }
    }
}

/// The structured payload of an [`InputEvent`]. Values are 7-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMessage {
    ControlChange { channel: u8, control: u8, value: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    #[serde(other)]
    Other,
}

impl InputMessage {
    /// The value of a control change on `control`, on any channel.
    pub fn cc_value(&self, control: u8) -> Option<u8> {
        match *self {
            Self::ControlChange {
                control: c, value, ..
            } if c == control => Some(value),
            _ => None,
        }
    }
}

/// A producer of input events. `Ok(None)` means the source is exhausted.
pub trait InputSource: Send {
    fn next_event(
        &mut self,
    ) -> impl Future<Output = Result<Option<InputEvent>, InputError>> + Send;
}

/// Reads newline-delimited JSON events from an async reader.
#[derive(Debug)]
pub struct JsonLinesInput<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl JsonLinesInput<tokio::io::BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> InputSource for JsonLinesInput<R> {
    async fn next_event(&mut self) -> Result<Option<InputEvent>, InputError> {
        while let Some(text) = self.lines.next_line().await? {
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            let event: InputEvent = serde_json::from_str(&text).map_err(|source| {
                InputError::Decode {
                    line: self.line,
                    source,
                }
            })?;
            trace!(port = %event.port, message = ?event.message, "input event");
            return Ok(Some(event));
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn reads_events_and_skips_blank_lines() {
        let text = concat!(
            r#"{"port":"nano","type":"control_change","channel":0,"control":14,"value":100}"#,
            "\n\n",
            r#"{"port":"nano","type":"note_on","channel":1,"note":60,"velocity":90,"timestamp":"2024-01-01T00:00:00Z"}"#,
            "\n",
            r#"{"port":"nano","type":"pitch_bend"}"#,
            "\n",
        );
        let mut input = JsonLinesInput::new(text.as_bytes());

        let first = input.next_event().await.unwrap().unwrap();
        assert_eq!(first.port, "nano");
        assert_eq!(first.message.cc_value(14), Some(100));
        assert_eq!(first.message.cc_value(15), None);

        let second = input.next_event().await.unwrap().unwrap();
        assert_eq!(
            second.message,
            InputMessage::NoteOn {
                channel: 1,
                note: 60,
                velocity: 90
            }
        );
        assert_eq!(second.timestamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let third = input.next_event().await.unwrap().unwrap();
        assert_eq!(third.message, InputMessage::Other);

        assert!(input.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bad_line_reports_its_number() {
        let mut input = JsonLinesInput::new("\n{\"port\": 3}\n".as_bytes());
        let err = input.next_event().await.unwrap_err();
        assert!(matches!(err, InputError::Decode { line: 2, .. }));
    }
}
