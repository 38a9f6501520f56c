//! Renderer, frame resources, and the per-core recording pool.

pub mod frame;
pub mod renderer;
pub mod vulkan;
pub mod workers;

pub use frame::{FrameConstants, FrameSlot, FRAME_BUFFERING};
pub use renderer::{RunState, StardustRenderer};

/// Per-core CPU load supplier.
///
/// Sampled once per completed stats window, not per frame; implementations
/// are free to keep state between calls (for `/proc/stat` deltas and the
/// like).
pub trait CpuLoadSource {
    /// Current load per logical core, in percent. May return fewer entries
    /// than there are graphs; missing cores simply keep their last sample.
    fn sample(&mut self) -> Vec<f32>;
}

/// Input collected by the host application for one frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameEvents {
    pub toggle_animation: bool,
    pub quit: bool,
}
