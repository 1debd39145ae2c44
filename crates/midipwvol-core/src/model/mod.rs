// ── Domain model ──
//
// Identity, the mirrored object wrapper, and the value types shared by
// the control side.

pub mod level;
pub mod object;
pub mod object_id;
pub mod volume;

pub use level::Level;
pub use object::{Classification, MirroredObject};
pub use object_id::ObjectId;
pub use volume::{volume_from_linear, volume_to_linear};
