//! On-screen performance overlay: per-core CPU-load graphs and text.
//!
//! Vertex generation is plain CPU math writing [`bytemuck::Pod`] structs;
//! the renderer copies the results into host-visible vertex buffers.

pub mod graph;
pub mod text;

pub use graph::{GraphVertex, SampleRing, COMMON_VERTEX_CAPACITY, GRAPH_SAMPLES};
pub use text::{append_text, FontAtlas, FontError, GlyphMetrics, TextVertex, MAX_TEXT_VERTICES};
