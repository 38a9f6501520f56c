//! Simulation state: animation, camera, and point partitioning.
//!
//! Everything in here is plain CPU math with no Vulkan handles, so it is
//! fully testable without a device.

pub mod animation;
pub mod camera;
pub mod partition;

pub use animation::AnimationState;
pub use camera::Camera;
pub use partition::PointPartition;
