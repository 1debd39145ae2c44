// ── Object mirror ──
//
// Session-owned table of live PipeWire objects, fed by monitor diffs and
// read concurrently by handlers.

mod apply;
mod mirror;

pub use mirror::{Mirror, MirrorSnapshot};
