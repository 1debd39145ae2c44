// ── Resumable JSON framer ──
//
// Turns an arbitrary sequence of byte chunks into complete JSON values.
// The framer owns no I/O: the supervisor pushes whatever the pipe had and
// pulls values until the buffer holds only a partial one.

use serde_json::Value;

use crate::error::StreamError;

/// Buffer size past which an incomplete value is treated as a desync.
pub const DEFAULT_BUFFER_CEILING: usize = 16 * 1024 * 1024;

/// Incremental decoder for back-to-back JSON values.
#[derive(Debug)]
pub struct StreamFramer {
    buffer: Vec<u8>,
    ceiling: usize,
}

impl StreamFramer {
    pub fn new() -> Self {
        Self::with_ceiling(DEFAULT_BUFFER_CEILING)
    }

    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            buffer: Vec::new(),
            ceiling,
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.buffer.is_empty() {
            // Skip inter-value whitespace early so `is_empty` stays meaningful.
            let start = leading_whitespace(bytes);
            self.buffer.extend_from_slice(&bytes[start..]);
        } else {
            self.buffer.extend_from_slice(bytes);
        }
    }

    /// Decode one complete value from the front of the buffer.
    ///
    /// Returns `Ok(None)` when the buffer is empty or holds only a
    /// truncated prefix; the bytes stay buffered for the next call.
    pub fn next_value(&mut self) -> Result<Option<Value>, StreamError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let (next, offset) = {
            let mut values =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
            let next = values.next();
            (next, values.byte_offset())
        };

        match next {
            Some(Ok(value)) => {
                self.consume(offset);
                Ok(Some(value))
            }
            Some(Err(err)) if err.is_eof() => {
                if self.buffer.len() > self.ceiling {
                    return Err(StreamError::Overflow {
                        len: self.buffer.len(),
                        ceiling: self.ceiling,
                    });
                }
                Ok(None)
            }
            Some(Err(err)) => Err(StreamError::Malformed {
                offset,
                message: err.to_string(),
            }),
            None => {
                // Only whitespace was buffered.
                self.buffer.clear();
                Ok(None)
            }
        }
    }

    /// Drain every complete value currently buffered.
    pub fn drain(&mut self) -> Result<Vec<Value>, StreamError> {
        let mut out = Vec::new();
        while let Some(value) = self.next_value()? {
            out.push(value);
        }
        Ok(out)
    }

    /// Forget everything buffered. Used when the producer restarts.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes held back waiting for the rest of a value.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop the decoded prefix plus any whitespace that follows it.
    fn consume(&mut self, consumed: usize) {
        let rest = self.buffer.get(consumed..).unwrap_or_default();
        let skip = consumed + leading_whitespace(rest);
        self.buffer.drain(..skip.min(self.buffer.len()));
    }
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn leading_whitespace(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|b| b.is_ascii_whitespace())
        .count()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn truncated_value_resumes_on_next_chunk() {
        let mut framer = StreamFramer::new();

        framer.push(b"[1, 2");
        assert!(framer.next_value().unwrap().is_none());
        assert_eq!(framer.buffered(), 5);

        framer.push(b", 3]");
        assert_eq!(framer.next_value().unwrap(), Some(json!([1, 2, 3])));
        assert!(framer.next_value().unwrap().is_none());
        assert!(framer.is_empty());
    }

    #[test]
    fn several_values_in_one_chunk() {
        let mut framer = StreamFramer::new();
        framer.push(b"[{\"id\":1}]\n[{\"id\":2}]\n  [");

        let values = framer.drain().unwrap();
        assert_eq!(values, vec![json!([{"id": 1}]), json!([{"id": 2}])]);
        assert_eq!(framer.buffered(), 1);
    }

    #[test]
    fn split_inside_multibyte_character() {
        let text = "[{\"name\":\"Kopfhörer\"}]";
        let bytes = text.as_bytes();
        let split = text.find('ö').unwrap() + 1;

        let mut framer = StreamFramer::new();
        framer.push(&bytes[..split]);
        assert!(framer.next_value().unwrap().is_none());

        framer.push(&bytes[split..]);
        assert_eq!(
            framer.next_value().unwrap(),
            Some(json!([{ "name": "Kopfhörer" }]))
        );
    }

    #[test]
    fn whitespace_only_input_yields_nothing() {
        let mut framer = StreamFramer::new();
        framer.push(b" \n\t ");
        assert!(framer.next_value().unwrap().is_none());
        assert!(framer.is_empty());
    }

    #[test]
    fn incomplete_value_past_ceiling_is_fatal() {
        let mut framer = StreamFramer::with_ceiling(8);
        framer.push(b"[\"0123456789");

        let err = framer.next_value().unwrap_err();
        assert!(matches!(err, StreamError::Overflow { len: 12, ceiling: 8 }));
    }

    #[test]
    fn complete_value_larger_than_ceiling_is_accepted() {
        let mut framer = StreamFramer::with_ceiling(4);
        framer.push(b"[1,2,3,4,5]");
        assert_eq!(framer.next_value().unwrap(), Some(json!([1, 2, 3, 4, 5])));
    }

    #[test]
    fn garbage_is_malformed() {
        let mut framer = StreamFramer::new();
        framer.push(b"[1, }");
        assert!(matches!(
            framer.next_value().unwrap_err(),
            StreamError::Malformed { .. }
        ));
    }

    #[test]
    fn reset_discards_partial_value() {
        let mut framer = StreamFramer::new();
        framer.push(b"[{\"id\":");
        framer.reset();
        framer.push(b"[]");
        assert_eq!(framer.next_value().unwrap(), Some(json!([])));
    }
}
