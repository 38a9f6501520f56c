//! Font atlas and text layout for the overlay.
//!
//! A monospace TTF is rasterized once at startup into a single-channel
//! atlas (uploaded as an R8 image); layout walks a string and appends one
//! four-vertex triangle-strip quad per glyph. The renderer issues one draw
//! per glyph from a shared per-frame vertex buffer.

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// First/last ASCII codepoint present in the atlas.
const FIRST_CHAR: char = ' ';
const LAST_CHAR: char = '~';
/// Number of glyphs in the atlas (printable ASCII).
pub const GLYPH_COUNT: usize = (LAST_CHAR as usize - FIRST_CHAR as usize) + 1;

/// Fixed atlas width; rows are shelf-packed below each other.
const ATLAS_WIDTH: usize = 512;

/// Capacity of the per-frame text vertex buffer (4 vertices per glyph).
pub const MAX_TEXT_VERTICES: usize = 1024;

/// Errors from font loading and rasterization.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("Failed to read font file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse font: {0}")]
    Parse(&'static str),
}

/// Vertex layout of the font pipeline: NDC position + atlas UV.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TextVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

/// Pixel-space quad and UV rectangle for one glyph.
///
/// Quad offsets are relative to the pen position, y growing downward.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlyphMetrics {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
    pub advance: f32,
}

/// Rasterized ASCII atlas plus per-glyph metrics.
pub struct FontAtlas {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    glyphs: [GlyphMetrics; GLYPH_COUNT],
}

impl FontAtlas {
    /// Load a TTF file and rasterize the printable ASCII range at `px`.
    pub fn from_file(path: impl AsRef<std::path::Path>, px: f32) -> Result<Self, FontError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, px)
    }

    pub fn from_bytes(bytes: &[u8], px: f32) -> Result<Self, FontError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(FontError::Parse)?;

        struct Raster {
            metrics: fontdue::Metrics,
            bitmap: Vec<u8>,
        }
        let rasters: Vec<Raster> = (FIRST_CHAR..=LAST_CHAR)
            .map(|ch| {
                let (metrics, bitmap) = font.rasterize(ch, px);
                Raster { metrics, bitmap }
            })
            .collect();

        // Shelf-pack: glyphs flow left to right, rows stack downward with a
        // one-pixel gutter against sampler bleed.
        let mut placements = Vec::with_capacity(GLYPH_COUNT);
        let mut pen_x = 0usize;
        let mut pen_y = 0usize;
        let mut row_height = 0usize;
        for raster in &rasters {
            let w = raster.metrics.width;
            let h = raster.metrics.height;
            if pen_x + w + 1 > ATLAS_WIDTH {
                pen_x = 0;
                pen_y += row_height + 1;
                row_height = 0;
            }
            placements.push((pen_x, pen_y));
            pen_x += w + 1;
            row_height = row_height.max(h);
        }
        let height = pen_y + row_height + 1;

        let mut pixels = vec![0u8; ATLAS_WIDTH * height];
        let mut glyphs = [GlyphMetrics::default(); GLYPH_COUNT];
        for (i, raster) in rasters.iter().enumerate() {
            let (gx, gy) = placements[i];
            let w = raster.metrics.width;
            let h = raster.metrics.height;
            for row in 0..h {
                let src = &raster.bitmap[row * w..row * w + w];
                let dst = (gy + row) * ATLAS_WIDTH + gx;
                pixels[dst..dst + w].copy_from_slice(src);
            }
            // fontdue reports ymin from the baseline, y growing upward;
            // quads use y growing downward from the pen.
            let top = -(raster.metrics.ymin as f32) - h as f32;
            glyphs[i] = GlyphMetrics {
                x0: raster.metrics.xmin as f32,
                y0: top,
                x1: raster.metrics.xmin as f32 + w as f32,
                y1: top + h as f32,
                u0: gx as f32 / ATLAS_WIDTH as f32,
                v0: gy as f32 / height as f32,
                u1: (gx + w) as f32 / ATLAS_WIDTH as f32,
                v1: (gy + h) as f32 / height as f32,
                advance: raster.metrics.advance_width,
            };
        }

        Ok(Self {
            pixels,
            width: ATLAS_WIDTH as u32,
            height: height as u32,
            glyphs,
        })
    }

    /// Raw R8 pixel data, row-major, `width x height`.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn metrics(&self) -> &[GlyphMetrics; GLYPH_COUNT] {
        &self.glyphs
    }
}

/// Append one quad per printable-ASCII glyph of `text` starting at pixel
/// position `(x, y)`. Returns the number of glyphs appended.
///
/// Characters outside the atlas range are skipped. Appending stops when the
/// vertex buffer capacity would be exceeded, so overlong strings are
/// truncated instead of overflowing.
pub fn append_text(
    out: &mut Vec<TextVertex>,
    metrics: &[GlyphMetrics; GLYPH_COUNT],
    text: &str,
    x: i32,
    y: i32,
    screen_width: u32,
    screen_height: u32,
) -> usize {
    let rw = 1.0 / screen_width as f32;
    let rh = 1.0 / screen_height as f32;
    let mut pen_x = x as f32;
    let pen_y = y as f32;
    let mut glyphs = 0;

    for ch in text.chars() {
        if !(FIRST_CHAR..=LAST_CHAR).contains(&ch) {
            continue;
        }
        if out.len() + 4 > MAX_TEXT_VERTICES {
            break;
        }
        let g = &metrics[ch as usize - FIRST_CHAR as usize];
        let x0 = (pen_x + g.x0) * 2.0 * rw - 1.0;
        let x1 = (pen_x + g.x1) * 2.0 * rw - 1.0;
        let y0 = (pen_y + g.y0) * 2.0 * rh - 1.0;
        let y1 = (pen_y + g.y1) * 2.0 * rh - 1.0;

        out.push(TextVertex { pos: [x0, y0], uv: [g.u0, g.v0] });
        out.push(TextVertex { pos: [x1, y0], uv: [g.u1, g.v0] });
        out.push(TextVertex { pos: [x0, y1], uv: [g.u0, g.v1] });
        out.push(TextVertex { pos: [x1, y1], uv: [g.u1, g.v1] });

        pen_x += g.advance;
        glyphs += 1;
    }
    glyphs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_metrics() -> [GlyphMetrics; GLYPH_COUNT] {
        // Monospace 10x20 cells, one atlas row.
        let mut table = [GlyphMetrics::default(); GLYPH_COUNT];
        for (i, g) in table.iter_mut().enumerate() {
            *g = GlyphMetrics {
                x0: 0.0,
                y0: -16.0,
                x1: 10.0,
                y1: 4.0,
                u0: i as f32 / GLYPH_COUNT as f32,
                v0: 0.0,
                u1: (i + 1) as f32 / GLYPH_COUNT as f32,
                v1: 1.0,
                advance: 12.0,
            };
        }
        table
    }

    #[test]
    fn four_vertices_per_glyph() {
        let metrics = fake_metrics();
        let mut verts = Vec::new();
        let glyphs = append_text(&mut verts, &metrics, "CPU Load", 10, 10, 800, 600);
        assert_eq!(glyphs, 8);
        assert_eq!(verts.len(), 32);
    }

    #[test]
    fn pen_advances_monotonically() {
        let metrics = fake_metrics();
        let mut verts = Vec::new();
        append_text(&mut verts, &metrics, "abcd", 0, 0, 800, 600);
        let lefts: Vec<f32> = verts.chunks(4).map(|q| q[0].pos[0]).collect();
        for pair in lefts.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        // Monospace: constant advance between quads.
        let d0 = lefts[1] - lefts[0];
        let d1 = lefts[2] - lefts[1];
        assert!((d0 - d1).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_characters_are_skipped() {
        let metrics = fake_metrics();
        let mut verts = Vec::new();
        let glyphs = append_text(&mut verts, &metrics, "a\tb\u{263a}c", 0, 0, 800, 600);
        assert_eq!(glyphs, 3);
        assert_eq!(verts.len(), 12);
    }

    #[test]
    fn overlong_strings_truncate_at_capacity() {
        let metrics = fake_metrics();
        let mut verts = Vec::new();
        let long: String = std::iter::repeat('x').take(500).collect();
        let glyphs = append_text(&mut verts, &metrics, &long, 0, 0, 800, 600);
        assert_eq!(glyphs, MAX_TEXT_VERTICES / 4);
        assert_eq!(verts.len(), MAX_TEXT_VERTICES);

        // Further appends are rejected outright.
        let more = append_text(&mut verts, &metrics, "y", 0, 0, 800, 600);
        assert_eq!(more, 0);
        assert_eq!(verts.len(), MAX_TEXT_VERTICES);
    }

    #[test]
    fn quads_land_in_ndc() {
        let metrics = fake_metrics();
        let mut verts = Vec::new();
        append_text(&mut verts, &metrics, "FPS 60.0", 10, 580, 800, 600);
        for v in &verts {
            assert!(v.pos[0] >= -1.0 && v.pos[0] <= 1.0);
            assert!(v.pos[1] >= -1.0 && v.pos[1] <= 1.0);
        }
        // Text near the bottom of the screen sits near y = +1.
        assert!(verts[0].pos[1] > 0.8);
    }
}
