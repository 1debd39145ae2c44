// midipwvol-core: PipeWire object mirror fed by `pw-dump --monitor`,
// attribute queries over it, and debounced control dispatch.

pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod model;
pub mod monitor;
pub mod query;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControlsConfig, MonitorConfig, RelaunchPolicy, RuntimeConfig};
pub use control::{
    CoalescingScheduler, ControlSurface, DdcutilSurface, DisplayField, FlushReport,
    PipeWireVolumeSurface, VolumeField, VolumeTarget,
};
pub use dispatch::{DispatchItem, Dispatcher, InputHandler, dispatch_queue};
pub use error::{
    ControlError, CoreError, DispatchError, HandlerError, InputError, MonitorError, QueryError,
    StreamError,
};
pub use input::{InputEvent, InputMessage, InputSource, JsonLinesInput};
pub use model::{Classification, Level, MirroredObject, ObjectId};
pub use monitor::{DiffBatch, DiffOp, MonitorItem, MonitorProcess, StreamFramer};
pub use query::{Attribute, Filter, Matcher, Query};
pub use store::Mirror;
