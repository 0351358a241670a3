//! Frame pacing: fence timeline and the per-frame slot ring.

mod ring;
mod timeline;

pub use ring::{FrameBeginInfo, FrameSlot, FrameSlotRing};
pub use timeline::{FenceTimeline, DEFAULT_TIMEOUT_NS};
