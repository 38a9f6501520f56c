//! CPU-load graph sample rings and vertex generation.
//!
//! Each core gets a small scrolling graph. A fixed-capacity ring holds the
//! most recent samples; every frame the ring is expanded into a filled
//! triangle strip plus an outline line strip, newest sample at the right
//! edge. A second, shared vertex buffer carries the background quad, frame
//! outline, scrolling grid, and legend quads that all graphs draw through
//! their own viewports.

use bytemuck::{Pod, Zeroable};

/// Number of samples a graph remembers (and its horizontal resolution).
pub const GRAPH_SAMPLES: usize = 60;
/// On-screen graph width in pixels.
pub const GRAPH_WIDTH: u32 = 200;
/// Reference height used for the one-pixel frame inset.
pub const GRAPH_HEIGHT: u32 = 134;

/// Vertex count of the per-graph buffer: fill strip + outline strip.
pub const GRAPH_VERTEX_COUNT: usize = GRAPH_SAMPLES * 3;
/// Capacity of the shared background/grid/legend buffer.
pub const COMMON_VERTEX_CAPACITY: usize = 64;

/// Vertex layout shared by every overlay-graph pipeline.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GraphVertex {
    pub pos: [f32; 2],
    pub color: [f32; 4],
}

/// Fixed-capacity ring of load samples with an optional per-sample baseline.
///
/// A freshly created ring is `empty`: pushes are ignored until the ring is
/// primed, which keeps garbage out of the graphs before the first real
/// sampling window has completed.
#[derive(Debug, Clone)]
pub struct SampleRing {
    sample: [f32; GRAPH_SAMPLES],
    sample_y: [f32; GRAPH_SAMPLES],
    cursor: usize,
    empty: bool,
    scale: f32,
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleRing {
    pub fn new() -> Self {
        Self {
            sample: [0.0; GRAPH_SAMPLES],
            sample_y: [0.0; GRAPH_SAMPLES],
            cursor: 0,
            empty: true,
            scale: 1.0,
        }
    }

    /// Accept pushes from now on. Idempotent.
    pub fn prime(&mut self) {
        self.empty = false;
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Zero all samples and rewind the cursor. The primed state is kept.
    pub fn clear(&mut self) {
        self.sample = [0.0; GRAPH_SAMPLES];
        self.sample_y = [0.0; GRAPH_SAMPLES];
        self.cursor = 0;
    }

    /// Push a sample with a zero baseline. Ignored while the ring is empty.
    pub fn push(&mut self, s: f32) {
        self.push_with_baseline(s, 0.0);
    }

    /// Push a sample stacked on top of `baseline`.
    pub fn push_with_baseline(&mut self, s: f32, baseline: f32) {
        if self.empty {
            return;
        }
        self.sample_y[self.cursor] = baseline;
        self.sample[self.cursor] = s;
        self.cursor = (self.cursor + 1) % GRAPH_SAMPLES;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// Write cursor, used to phase the scrolling grid.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Samples ordered newest to oldest.
    pub fn newest_to_oldest(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        let mut idx = self.cursor;
        (0..GRAPH_SAMPLES).map(move |_| {
            idx = idx.checked_sub(1).unwrap_or(GRAPH_SAMPLES - 1);
            (self.sample[idx], self.sample_y[idx])
        })
    }

    /// Expand the ring into the per-graph vertex buffer contents.
    ///
    /// Layout: `GRAPH_SAMPLES * 2` fill-strip vertices (dimmed color,
    /// alternating baseline/sample height per column), then `GRAPH_SAMPLES`
    /// line-strip vertices at full color. Newest sample lands at the right
    /// edge; x walks left in fixed steps, slightly shrunk and shifted to
    /// keep the strip inside the one-pixel frame.
    pub fn vertices(&self, color: [f32; 4]) -> Vec<GraphVertex> {
        let mut out = Vec::with_capacity(GRAPH_VERTEX_COUNT);
        let dim = [color[0] * 0.5, color[1] * 0.5, color[2] * 0.5, color[3] * 0.1];

        for (i, (s, y)) in self.newest_to_oldest().enumerate() {
            let x = column_x(i);
            out.push(GraphVertex {
                pos: [x, sample_y_ndc(y, self.scale)],
                color: dim,
            });
            out.push(GraphVertex {
                pos: [x, sample_y_ndc(s + y, self.scale)],
                color: dim,
            });
        }
        for (i, (s, y)) in self.newest_to_oldest().enumerate() {
            out.push(GraphVertex {
                pos: [column_x(i), sample_y_ndc(s + y, self.scale)],
                color,
            });
        }
        out
    }
}

/// NDC x of the `i`-th column from the right edge.
fn column_x(i: usize) -> f32 {
    (1.0 - i as f32 * (2.0 / GRAPH_SAMPLES as f32)) * 0.999 - 0.02
}

/// Map a scaled sample in `[0, 1]` to NDC y (1 at the bottom, -1 at the top).
fn sample_y_ndc(value: f32, scale: f32) -> f32 {
    -(2.0 * (value * scale - 0.5)) * 0.97
}

const GRID_COLOR: [f32; 4] = [0.0, 0.1, 0.2, 0.25];
const FRAME_COLOR: [f32; 4] = [0.0, 0.3, 0.55, 0.25];
const BACKGROUND_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.3];

/// Vertices shared by every graph: background quad (4, triangle strip),
/// frame outline + scrolling grid (38, line list), and two legend quads.
///
/// `cursor` phases the vertical grid lines so they scroll left in step with
/// the incoming samples.
pub fn common_vertices(cursor: usize) -> Vec<GraphVertex> {
    let mut out = Vec::with_capacity(COMMON_VERTEX_CAPACITY);

    // Background quad in strip order.
    for pos in [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]] {
        out.push(GraphVertex { pos, color: BACKGROUND_COLOR });
    }

    // One-pixel inset frame as four line-list segments.
    let woff = 2.0 / GRAPH_WIDTH as f32;
    let hoff = 2.0 / GRAPH_HEIGHT as f32;
    let corners = [
        ([-1.0 + woff, -1.0 + hoff], [1.0 - woff, -1.0 + hoff]),
        ([1.0 - woff, -1.0 + hoff], [1.0 - woff, 1.0 - hoff]),
        ([1.0 - woff, 1.0 - hoff], [-1.0 + woff, 1.0 - hoff]),
        ([-1.0 + woff, 1.0 - hoff], [-1.0 + woff, -1.0 + hoff]),
    ];
    for (a, b) in corners {
        out.push(GraphVertex { pos: a, color: FRAME_COLOR });
        out.push(GraphVertex { pos: b, color: FRAME_COLOR });
    }

    // Vertical grid lines scroll with the sample cursor.
    let shift = 2.0 * ((cursor % (GRAPH_SAMPLES / 6)) as f32 / GRAPH_SAMPLES as f32);
    for i in 1..=6 {
        let x = -1.0 + i as f32 * (2.0 / 6.0) - shift;
        out.push(GraphVertex { pos: [x, -1.0], color: GRID_COLOR });
        out.push(GraphVertex { pos: [x, 1.0], color: GRID_COLOR });
    }
    for i in 1..=9 {
        let y = -1.0 + i as f32 * (2.0 / 10.0);
        out.push(GraphVertex { pos: [-1.0, y], color: GRID_COLOR });
        out.push(GraphVertex { pos: [1.0, y], color: GRID_COLOR });
    }

    // Legend quads for the combined-power readout.
    for color in [[0.85, 0.9, 0.0, 0.25], [0.85, 0.0, 0.0, 0.25]] {
        out.push(GraphVertex { pos: [-1.0, -1.0], color });
        out.push(GraphVertex { pos: [1.0, -1.0], color });
        out.push(GraphVertex { pos: [-1.0, 1.0], color });
        out.push(GraphVertex { pos: [1.0, 1.0], color });
    }

    debug_assert!(out.len() <= COMMON_VERTEX_CAPACITY);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const GREEN: [f32; 4] = [0.0, 0.85, 0.0, 1.0];

    #[test]
    fn pushes_are_dropped_until_primed() {
        let mut ring = SampleRing::new();
        ring.push(0.75);
        assert!(ring.is_empty());
        assert!(ring.newest_to_oldest().all(|(s, y)| s == 0.0 && y == 0.0));

        ring.prime();
        ring.push(0.75);
        assert_eq!(ring.newest_to_oldest().next(), Some((0.75, 0.0)));
    }

    #[test]
    fn reading_from_any_cursor_yields_full_history() {
        let mut ring = SampleRing::new();
        ring.prime();
        // Push more than capacity so the cursor wraps.
        for i in 0..(GRAPH_SAMPLES + 10) {
            ring.push(i as f32);
        }
        let samples: Vec<f32> = ring.newest_to_oldest().map(|(s, _)| s).collect();
        assert_eq!(samples.len(), GRAPH_SAMPLES);
        assert_eq!(samples[0], (GRAPH_SAMPLES + 9) as f32);
        assert_eq!(samples[GRAPH_SAMPLES - 1], 10.0);
    }

    #[test]
    fn clear_keeps_primed_state() {
        let mut ring = SampleRing::new();
        ring.prime();
        ring.push(0.5);
        ring.clear();
        assert!(!ring.is_empty());
        assert_eq!(ring.cursor(), 0);
        ring.push(0.25);
        assert_eq!(ring.newest_to_oldest().next(), Some((0.25, 0.0)));
    }

    #[test]
    fn vertex_layout_fill_then_line() {
        let mut ring = SampleRing::new();
        ring.prime();
        ring.push(1.0);
        let verts = ring.vertices(GREEN);
        assert_eq!(verts.len(), GRAPH_VERTEX_COUNT);

        // Fill strip is dimmed, outline is full color.
        assert_relative_eq!(verts[0].color[1], 0.425);
        assert_relative_eq!(verts[0].color[3], 0.1);
        assert_relative_eq!(verts[GRAPH_SAMPLES * 2].color[1], 0.85);

        // Newest sample (1.0) sits at the top of the graph, right edge.
        let top = &verts[GRAPH_SAMPLES * 2];
        assert_relative_eq!(top.pos[0], 0.999 - 0.02, epsilon = 1e-6);
        assert_relative_eq!(top.pos[1], -0.97, epsilon = 1e-6);
    }

    #[test]
    fn columns_walk_left_in_fixed_steps() {
        let ring = {
            let mut r = SampleRing::new();
            r.prime();
            r
        };
        let verts = ring.vertices(GREEN);
        let line = &verts[GRAPH_SAMPLES * 2..];
        for pair in line.windows(2) {
            let step = pair[0].pos[0] - pair[1].pos[0];
            assert_relative_eq!(step, (2.0 / 60.0) * 0.999, epsilon = 1e-5);
        }
    }

    #[test]
    fn zero_sample_maps_to_bottom() {
        let mut ring = SampleRing::new();
        ring.prime();
        ring.push(0.0);
        let verts = ring.vertices(GREEN);
        assert_relative_eq!(verts[GRAPH_SAMPLES * 2].pos[1], 0.97, epsilon = 1e-6);
        // Half load sits mid-graph.
        ring.push(0.5);
        let verts = ring.vertices(GREEN);
        assert_relative_eq!(verts[GRAPH_SAMPLES * 2].pos[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn common_buffer_fits_and_scrolls() {
        let at_zero = common_vertices(0);
        assert_eq!(at_zero.len(), 50);
        assert!(at_zero.len() <= COMMON_VERTEX_CAPACITY);

        // Grid lines shift left as the cursor advances, one ring-step at a time.
        let shifted = common_vertices(3);
        let grid_first = 4 + 8;
        assert_relative_eq!(
            at_zero[grid_first].pos[0] - shifted[grid_first].pos[0],
            2.0 * 3.0 / 60.0,
            epsilon = 1e-6
        );
        // The phase repeats every GRAPH_SAMPLES / 6 pushes.
        let wrapped = common_vertices(10);
        assert_relative_eq!(wrapped[grid_first].pos[0], at_zero[grid_first].pos[0]);
    }
}
