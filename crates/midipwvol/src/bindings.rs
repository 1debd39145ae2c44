//! Config-driven input handler: controller events → control requests.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use midipwvol_config::{Binding, BindingAction};
use midipwvol_core::{
    CoalescingScheduler, ControlSurface, DisplayField, HandlerError, InputEvent, InputHandler,
    Level, Mirror, VolumeField, VolumeTarget,
};

/// Applies [`Binding`]s to each input event.
///
/// Volume bindings are resolved against the mirror at event time, so a
/// sink that appears later is picked up without a restart. Nothing here
/// waits on I/O: requests are handed to the schedulers.
pub struct BindingHandler<V, D>
where
    V: ControlSurface<Target = VolumeTarget, Field = VolumeField>,
    D: ControlSurface<Target = u32, Field = DisplayField>,
{
    bindings: Vec<Binding>,
    volume: Arc<CoalescingScheduler<V>>,
    display: Arc<CoalescingScheduler<D>>,
}

impl<V, D> BindingHandler<V, D>
where
    V: ControlSurface<Target = VolumeTarget, Field = VolumeField>,
    D: ControlSurface<Target = u32, Field = DisplayField>,
{
    pub fn new(
        bindings: Vec<Binding>,
        volume: Arc<CoalescingScheduler<V>>,
        display: Arc<CoalescingScheduler<D>>,
    ) -> Self {
        Self {
            bindings,
            volume,
            display,
        }
    }

    fn apply(&self, mirror: &Mirror, binding: &Binding, level: Level) {
        match &binding.action {
            BindingAction::Volume { query } => {
                let Some(node) = mirror.query_one(query) else {
                    warn!(query = %query, "no object matches volume binding");
                    return;
                };
                let Some(target) = VolumeTarget::resolve(mirror, &node) else {
                    warn!(id = %node.id(), "matched object has no volume control");
                    return;
                };
                debug!(%target, %level, "volume requested");
                self.volume.request(target, VolumeField::Volume, level);
            }
            BindingAction::Display { field, displays } => {
                for &display_no in displays {
                    debug!(display = display_no, %field, %level, "display change requested");
                    self.display.request(display_no, *field, level);
                }
            }
        }
    }
}

impl<V, D> InputHandler for BindingHandler<V, D>
where
    V: ControlSurface<Target = VolumeTarget, Field = VolumeField>,
    D: ControlSurface<Target = u32, Field = DisplayField>,
{
    fn handle(&mut self, mirror: &Mirror, event: &InputEvent) -> Result<(), HandlerError> {
        let mut matched = false;
        for binding in &self.bindings {
            if !binding.accepts_port(&event.port) {
                continue;
            }
            let Some(value) = event.message.cc_value(binding.control) else {
                continue;
            };
            matched = true;
            self.apply(mirror, binding, binding.level(value));
        }
        if !matched {
            trace!(port = %event.port, message = ?event.message, "event matched no binding");
        }
        Ok(())
    }
}
