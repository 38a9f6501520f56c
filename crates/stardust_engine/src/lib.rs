//! Stardust engine
//!
//! A multi-threaded Vulkan particle demo: two million animated points, a
//! procedurally generated skybox, palette-driven coloring, and an on-screen
//! performance overlay. The interesting part is the per-frame fan-out of
//! command-buffer recording across one worker per CPU core and the single
//! batched queue submission that stitches the results back together.
//!
//! Window creation, event polling, and CPU-load sampling live in the host
//! application; the engine consumes them through narrow interfaces
//! ([`render::CpuLoadSource`], [`render::FrameEvents`], and a surface
//! creation callback).

pub mod config;
pub mod foundation;
pub mod overlay;
pub mod render;
pub mod sim;

pub use config::DemoConfig;
pub use render::renderer::StardustRenderer;
pub use render::vulkan::{VulkanError, VulkanResult};
pub use render::{CpuLoadSource, FrameEvents};
