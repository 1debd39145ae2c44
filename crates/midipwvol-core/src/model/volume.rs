// ── PipeWire volume curve ──
//
// WirePlumber's mixer API exposes a cubic relation between the linear
// (user-facing) volume and the raw channel volume stored in `Props`.

/// Convert a user-facing linear volume into the raw PipeWire value.
pub fn volume_from_linear(volume: f64) -> f64 {
    if volume <= 0.0 {
        return 0.0;
    }
    volume.powi(3)
}

/// Convert a raw PipeWire channel volume into the user-facing linear value.
pub fn volume_to_linear(volume: f64) -> f64 {
    if volume <= 0.0 {
        return 0.0;
    }
    volume.cbrt()
}
