// ── Queryable attributes ──
//
// The closed set of accessors a filter may name. Parsing an unknown name
// fails, so a typo in a binding surfaces as an error instead of a filter
// that quietly matches nothing.

use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::QueryError;
use crate::model::MirroredObject;

static TRUE: Value = Value::Bool(true);
static FALSE: Value = Value::Bool(false);
static NULL: Value = Value::Null;

/// An accessor over [`MirroredObject`].
///
/// Plain attributes use their `snake_case` name (`node_description`);
/// parameter groups keep PipeWire's spelling (`Props`, `Route`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Attribute {
    Id,
    Type,
    Direction,
    PortDirection,
    NodeDescription,
    NodeName,
    NodeNick,
    NodeId,
    DeviceId,
    DeviceDescription,
    DeviceNick,
    DeviceString,
    DeviceBus,
    DeviceFormFactor,
    DeviceIconName,
    MediaClass,
    MediaName,
    FormatDsp,
    DeviceProfileDescription,
    DeviceProfileName,
    PortAlias,
    PortName,
    IsSink,
    IsSource,
    IsAudio,
    IsVideo,
    IsMidi,
    Name,

    // ── Parameter groups ──
    #[strum(serialize = "PropInfo")]
    PropInfo,
    #[strum(serialize = "Props")]
    Props,
    #[strum(serialize = "EnumFormat")]
    EnumFormat,
    #[strum(serialize = "Format")]
    Format,
    #[strum(serialize = "EnumPortConfig")]
    EnumPortConfig,
    #[strum(serialize = "PortConfig")]
    PortConfig,
    #[strum(serialize = "Latency")]
    Latency,
    #[strum(serialize = "ProcessLatency")]
    ProcessLatency,
    #[strum(serialize = "Tag")]
    Tag,
    #[strum(serialize = "EnumProfile")]
    EnumProfile,
    #[strum(serialize = "Profile")]
    Profile,
    #[strum(serialize = "EnumRoute")]
    EnumRoute,
    #[strum(serialize = "Route")]
    Route,
    #[strum(serialize = "Buffers")]
    Buffers,
    #[strum(serialize = "IO")]
    Io,
    #[strum(serialize = "Meta")]
    Meta,
}

impl Attribute {
    /// Resolve an attribute by name.
    pub fn parse(name: &str) -> Result<Self, QueryError> {
        name.parse().map_err(|_| QueryError::UnknownAttribute {
            name: name.to_owned(),
        })
    }

    /// Read this attribute from `obj`.
    ///
    /// `id` is the only attribute that is computed into a fresh value;
    /// everything else borrows from the record.
    pub fn read(self, obj: &MirroredObject) -> AttributeValue<'_> {
        match self {
            Self::Id => AttributeValue::Owned(Value::from(obj.id().get())),
            other => AttributeValue::Borrowed(other.read_borrowed(obj)),
        }
    }

    fn read_borrowed(self, obj: &MirroredObject) -> &Value {
        let flags = obj.classification();
        match self {
            Self::Id => &NULL,
            Self::Type => obj.kind_value(),
            Self::Direction => obj.info_field("direction"),
            Self::PortDirection => obj.prop("port.direction"),
            Self::NodeDescription => obj.prop("node.description"),
            Self::NodeName => obj.prop("node.name"),
            Self::NodeNick => obj.prop("node.nick"),
            Self::NodeId => obj.prop("node.id"),
            Self::DeviceId => obj.prop("device.id"),
            Self::DeviceDescription => obj.prop("device.description"),
            Self::DeviceNick => obj.prop("device.nick"),
            Self::DeviceString => obj.prop("device.string"),
            Self::DeviceBus => obj.prop("device.bus"),
            Self::DeviceFormFactor => obj.prop("device.form-factor"),
            Self::DeviceIconName => obj.prop("device.icon-name"),
            Self::MediaClass => obj.prop("media.class"),
            Self::MediaName => obj.prop("media.name"),
            Self::FormatDsp => obj.prop("format.dsp"),
            Self::DeviceProfileDescription => obj.prop("device.profile.description"),
            Self::DeviceProfileName => obj.prop("device.profile.name"),
            Self::PortAlias => obj.prop("port.alias"),
            Self::PortName => obj.prop("port.name"),
            Self::IsSink => flag(flags.is_sink),
            Self::IsSource => flag(flags.is_source),
            Self::IsAudio => flag(flags.is_audio),
            Self::IsVideo => flag(flags.is_video),
            Self::IsMidi => flag(flags.is_midi),
            Self::Name => obj.name_value().unwrap_or(&NULL),
            group => obj.params(group.as_ref()),
        }
    }
}

fn flag(value: bool) -> &'static Value {
    if value { &TRUE } else { &FALSE }
}

/// The value of one attribute on one object.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue<'a> {
    Borrowed(&'a Value),
    Owned(Value),
}

impl AttributeValue<'_> {
    pub fn as_value(&self) -> &Value {
        match self {
            Self::Borrowed(value) => value,
            Self::Owned(value) => value,
        }
    }
}

impl std::ops::Deref for AttributeValue<'_> {
    type Target = Value;

    fn deref(&self) -> &Value {
        self.as_value()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::model::ObjectId;

    fn port() -> MirroredObject {
        MirroredObject::from_record(
            ObjectId::new(31),
            json!({
                "id": 31,
                "type": "PipeWire:Interface:Port",
                "info": {
                    "direction": "output",
                    "props": {
                        "port.direction": "out",
                        "port.name": "capture_FL",
                        "format.dsp": "32 bit float mono audio",
                        "node.id": 30,
                    },
                    "params": { "EnumFormat": [{ "mediaType": "audio" }] }
                }
            }),
        )
    }

    #[test]
    fn names_round_trip() {
        for attr in Attribute::iter() {
            assert_eq!(Attribute::parse(attr.as_ref()).unwrap(), attr);
        }
        assert_eq!(Attribute::parse("node_description").unwrap(), Attribute::NodeDescription);
        assert_eq!(Attribute::parse("IO").unwrap(), Attribute::Io);
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let err = Attribute::parse("volume").unwrap_err();
        assert!(matches!(err, QueryError::UnknownAttribute { name } if name == "volume"));
    }

    #[test]
    fn reads_plain_and_derived_attributes() {
        let obj = port();
        assert_eq!(*Attribute::Id.read(&obj), json!(31));
        assert_eq!(*Attribute::Type.read(&obj), json!("Port"));
        assert_eq!(*Attribute::Direction.read(&obj), json!("output"));
        assert_eq!(*Attribute::PortDirection.read(&obj), json!("out"));
        assert_eq!(*Attribute::NodeId.read(&obj), json!(30));
        assert_eq!(*Attribute::IsAudio.read(&obj), json!(true));
        assert_eq!(*Attribute::IsSink.read(&obj), json!(false));
        assert_eq!(*Attribute::Name.read(&obj), json!("capture_FL"));
        assert_eq!(*Attribute::DeviceBus.read(&obj), json!(""));
    }

    #[test]
    fn reads_parameter_groups() {
        let obj = port();
        assert_eq!(*Attribute::EnumFormat.read(&obj), json!([{ "mediaType": "audio" }]));
        assert_eq!(*Attribute::Route.read(&obj), json!([]));
    }
}
