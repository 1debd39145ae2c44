// ── Mirrored PipeWire object ──
//
// An immutable parsed record plus accessors for the handful of fields
// bindings care about. The raw JSON is kept whole; nothing the monitor
// sends is dropped.

use std::fmt;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use super::ObjectId;

const TYPE_PREFIX: &str = "PipeWire:Interface:";

static EMPTY_STRING: Value = Value::String(String::new());
static EMPTY_LIST: Value = Value::Array(Vec::new());

/// Fallback order for [`MirroredObject::name`]. `node.nick` is left out:
/// several outputs of one card usually share it.
const NAME_CANDIDATES: [&str; 9] = [
    "device.nick",
    "device.description",
    "device.profile.description",
    "node.description",
    "media.name",
    "device.profile.name",
    "node.name",
    "port.alias",
    "port.name",
];

/// Class flags derived from `media.class` and `format.dsp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub is_sink: bool,
    pub is_source: bool,
    pub is_audio: bool,
    pub is_video: bool,
    pub is_midi: bool,
}

impl Classification {
    /// `media_class` looks like `Audio/Sink` or `Stream/Output/Audio`;
    /// ports carry `format_dsp` such as `32 bit float mono audio`.
    pub fn derive(media_class: &str, format_dsp: &str) -> Self {
        Self {
            is_sink: media_class.contains("Sink") || media_class.contains("Input"),
            is_source: media_class.contains("Source") || media_class.contains("Output"),
            is_audio: media_class.contains("Audio") || format_dsp.contains("audio"),
            is_video: media_class.contains("Video"),
            is_midi: media_class.contains("Midi") || format_dsp.contains("midi"),
        }
    }
}

/// One live object of the PipeWire graph.
pub struct MirroredObject {
    id: ObjectId,
    kind: Value,
    raw: Value,
    classification: OnceLock<Classification>,
}

impl MirroredObject {
    /// Wrap a raw monitor record. The caller has already extracted `id`.
    pub fn from_record(id: ObjectId, raw: Value) -> Self {
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .map(|t| t.strip_prefix(TYPE_PREFIX).unwrap_or(t))
            .unwrap_or_default()
            .to_owned();

        Self {
            id,
            kind: Value::String(kind),
            raw,
            classification: OnceLock::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Interface type without the `PipeWire:Interface:` prefix (`Node`, `Port`, ...).
    pub fn kind(&self) -> &str {
        self.kind.as_str().unwrap_or_default()
    }

    pub(crate) fn kind_value(&self) -> &Value {
        &self.kind
    }

    /// The complete record as received from the monitor.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn info(&self) -> Option<&Map<String, Value>> {
        self.raw.get("info").and_then(Value::as_object)
    }

    /// A top-level `info` field, `""` when absent.
    pub fn info_field(&self, key: &str) -> &Value {
        self.info().and_then(|i| i.get(key)).unwrap_or(&EMPTY_STRING)
    }

    pub fn props(&self) -> Option<&Map<String, Value>> {
        self.info()
            .and_then(|i| i.get("props"))
            .and_then(Value::as_object)
    }

    /// A property value, `""` when absent. Some properties (`device.id`,
    /// `object.serial`) are integers, so the raw value is returned.
    pub fn prop(&self, key: &str) -> &Value {
        self.props().and_then(|p| p.get(key)).unwrap_or(&EMPTY_STRING)
    }

    /// A property as a string slice, `""` when absent or not a string.
    pub fn prop_str(&self, key: &str) -> &str {
        self.prop(key).as_str().unwrap_or_default()
    }

    /// A parameter group (`Props`, `Route`, ...), an empty list when absent.
    pub fn params(&self, group: &str) -> &Value {
        self.info()
            .and_then(|i| i.get("params"))
            .and_then(|p| p.get(group))
            .unwrap_or(&EMPTY_LIST)
    }

    pub fn media_class(&self) -> &str {
        self.prop_str("media.class")
    }

    /// Class flags, computed on first access.
    pub fn classification(&self) -> Classification {
        *self.classification.get_or_init(|| {
            Classification::derive(self.media_class(), self.prop_str("format.dsp"))
        })
    }

    /// The first non-empty human-readable label among the name candidates.
    pub fn name(&self) -> Option<&str> {
        self.name_value().and_then(Value::as_str)
    }

    pub(crate) fn name_value(&self) -> Option<&Value> {
        NAME_CANDIDATES
            .iter()
            .map(|key| self.prop(key))
            .find(|value| is_truthy(value))
    }
}

impl fmt::Debug for MirroredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirroredObject")
            .field("id", &self.id)
            .field("type", &self.kind())
            .field("media_class", &self.media_class())
            .field("name", &self.name())
            .finish()
    }
}

/// Mirrors the "empty means missing" convention of the monitor output.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
