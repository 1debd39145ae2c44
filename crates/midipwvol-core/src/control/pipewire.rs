// ── PipeWire volume via pw-cli ──
//
// Hardware sinks/sources expose volume through the active `Route` of
// their device; streams and virtual nodes through their own `Props`.
// Targets are resolved from the mirror when a request is made. Channel
// counts are read again at flush time, so a target names an endpoint only.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};

use super::{ControlSurface, run_tool};
use crate::error::ControlError;
use crate::model::{Level, MirroredObject, ObjectId, volume_from_linear};
use crate::store::Mirror;

/// Where a volume write goes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VolumeTarget {
    /// `Props.channelVolumes` of a node.
    Node { id: ObjectId },
    /// `props.channelVolumes` of a device route.
    Route {
        device: ObjectId,
        index: i64,
        route_device: i64,
    },
}

impl VolumeTarget {
    /// Find the volume endpoint of `node`: its device's active route when
    /// there is one, otherwise the node's own `Props`.
    pub fn resolve(mirror: &Mirror, node: &MirroredObject) -> Option<Self> {
        Self::resolve_route(mirror, node).or_else(|| Self::resolve_props(node))
    }

    fn resolve_route(mirror: &Mirror, node: &MirroredObject) -> Option<Self> {
        let device_id = node
            .prop("device.id")
            .as_u64()
            .and_then(|raw| u32::try_from(raw).ok())
            .map(ObjectId::new)?;
        let device = mirror.get_by_id(device_id)?;
        let profile_device = node.prop("card.profile.device").as_i64();

        let routes: Vec<&Value> = device
            .params("Route")
            .as_array()?
            .iter()
            .filter(|route| is_complete_route(route))
            .collect();
        let route = routes
            .iter()
            .find(|route| profile_device.is_some() && route["device"].as_i64() == profile_device)
            .or_else(|| routes.first())?;

        Some(Self::Route {
            device: device_id,
            index: route["index"].as_i64()?,
            route_device: route["device"].as_i64()?,
        })
    }

    fn resolve_props(node: &MirroredObject) -> Option<Self> {
        let props = node.params("Props").as_array()?.first()?;
        props.get("channelVolumes")?;
        Some(Self::Node { id: node.id() })
    }

    /// Current channel count of the endpoint, 1 when it is gone or unknown.
    pub fn channels(&self, mirror: &Mirror) -> usize {
        let count = match self {
            Self::Node { id } => mirror
                .get_by_id(*id)
                .and_then(|node| node.params("Props").get(0).map(channel_count)),
            Self::Route {
                device,
                index,
                route_device,
            } => mirror.get_by_id(*device).and_then(|device| {
                device
                    .params("Route")
                    .as_array()?
                    .iter()
                    .find(|route| {
                        route["index"].as_i64() == Some(*index)
                            && route["device"].as_i64() == Some(*route_device)
                    })
                    .map(|route| channel_count(&route["props"]))
            }),
        };
        count.unwrap_or(1)
    }
}

impl fmt::Display for VolumeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node { id } => write!(f, "node {id}"),
            Self::Route { device, index, .. } => write!(f, "device {device} route {index}"),
        }
    }
}

fn is_complete_route(route: &Value) -> bool {
    ["info", "props", "device", "index"]
        .iter()
        .all(|key| route.get(key).is_some())
}

fn channel_count(props: &Value) -> usize {
    props
        .get("channelVolumes")
        .and_then(Value::as_array)
        .map_or(1, |volumes| volumes.len().max(1))
}

/// The only field of a volume endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VolumeField {
    Volume,
}

impl fmt::Display for VolumeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("volume")
    }
}

/// Sets volumes with `pw-cli set-param`. Levels are linear (perceived)
/// volume; the cubic curve is applied at flush time.
#[derive(Debug, Clone)]
pub struct PipeWireVolumeSurface {
    program: PathBuf,
    mirror: Arc<Mirror>,
}

impl PipeWireVolumeSurface {
    /// `mirror` supplies channel counts when values are scaled.
    pub fn new(program: impl Into<PathBuf>, mirror: Arc<Mirror>) -> Self {
        Self {
            program: program.into(),
            mirror,
        }
    }

    pub fn args(target: &VolumeTarget, volumes: &[f64]) -> Vec<String> {
        match target {
            VolumeTarget::Node { id } => vec![
                "set-param".to_owned(),
                id.to_string(),
                "Props".to_owned(),
                json!({ "channelVolumes": volumes }).to_string(),
            ],
            VolumeTarget::Route {
                device,
                index,
                route_device,
            } => vec![
                "set-param".to_owned(),
                device.to_string(),
                "Route".to_owned(),
                json!({
                    "index": index,
                    "device": route_device,
                    "props": { "channelVolumes": volumes },
                    "save": true,
                })
                .to_string(),
            ],
        }
    }
}

impl ControlSurface for PipeWireVolumeSurface {
    type Target = VolumeTarget;
    type Field = VolumeField;
    type Native = Vec<f64>;

    fn name(&self) -> &'static str {
        "pw-cli"
    }

    fn scale(&self, target: &VolumeTarget, _field: VolumeField, level: Level) -> Vec<f64> {
        vec![volume_from_linear(level.get()); target.channels(&self.mirror)]
    }

    async fn send(
        &self,
        target: &VolumeTarget,
        _field: VolumeField,
        volumes: Vec<f64>,
    ) -> Result<(), ControlError> {
        run_tool(&self.program, &Self::args(target, &volumes)).await
    }
}
