pub mod canvas;

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::view::{Plot, PlotId};

pub use canvas::RasterCanvas;

/// Side length of a cached raw block, in decimated pixels.
pub const BLOCK_SIZE: u32 = 256;

/// Decimation level of a raw pixel buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decimation {
    Full,
    Half,
    Quarter,
}

impl Decimation {
    /// Raw pixels per decimated pixel on each axis.
    pub fn factor(self) -> u32 {
        match self {
            Decimation::Full => 1,
            Decimation::Half => 2,
            Decimation::Quarter => 4,
        }
    }

    /// Decimation that best matches a display zoom.
    pub fn preferred_for_zoom(zoom: f64) -> Self {
        if zoom >= 0.5 {
            Decimation::Full
        } else if zoom >= 0.25 {
            Decimation::Half
        } else {
            Decimation::Quarter
        }
    }
}

/// One decimated raw pixel block. `bx`/`by` index the block grid; pixel
/// (0,0) of the block sits at decimated coordinate
/// `(bx * BLOCK_SIZE, by * BLOCK_SIZE)`, display orientation.
#[derive(Clone, Debug)]
pub struct RawBlock {
    pub bx: u32,
    pub by: u32,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("block pixel buffer is {got} samples, expected {expected}")]
    SizeMismatch { got: usize, expected: usize },
    #[error("block dimensions {width}x{height} exceed {BLOCK_SIZE}")]
    BlockTooLarge { width: u32, height: u32 },
}

/// Per-plot cache of decimated raw blocks. The external fetch/decode
/// pipeline writes it; the compositor only reads.
#[derive(Default)]
pub struct RawTileCache {
    blocks: HashMap<(PlotId, Decimation), HashMap<(u32, u32), RawBlock>>,
}

impl RawTileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_block(
        &mut self,
        plot_id: PlotId,
        decimation: Decimation,
        block: RawBlock,
    ) -> Result<(), CacheError> {
        if block.width > BLOCK_SIZE || block.height > BLOCK_SIZE {
            return Err(CacheError::BlockTooLarge { width: block.width, height: block.height });
        }
        let expected = (block.width * block.height) as usize;
        if block.pixels.len() != expected {
            return Err(CacheError::SizeMismatch { got: block.pixels.len(), expected });
        }
        self.blocks
            .entry((plot_id, decimation))
            .or_default()
            .insert((block.bx, block.by), block);
        Ok(())
    }

    pub fn has_data(&self, plot_id: PlotId, decimation: Decimation) -> bool {
        self.blocks
            .get(&(plot_id, decimation))
            .is_some_and(|m| !m.is_empty())
    }

    /// Drop everything cached for a plot (plot removal / LRU eviction).
    pub fn clear_plot(&mut self, plot_id: PlotId) {
        self.blocks.retain(|(id, _), _| *id != plot_id);
    }

    fn blocks_for(
        &self,
        plot_id: PlotId,
        decimation: Decimation,
    ) -> Option<&HashMap<(u32, u32), RawBlock>> {
        self.blocks.get(&(plot_id, decimation)).filter(|m| !m.is_empty())
    }

    /// Preferred decimation for `zoom`, falling back to whatever level is
    /// actually populated for this plot.
    fn choose_decimation(&self, plot_id: PlotId, zoom: f64) -> Option<Decimation> {
        let preferred = Decimation::preferred_for_zoom(zoom);
        let order = [preferred, Decimation::Full, Decimation::Half, Decimation::Quarter];
        order.into_iter().find(|d| self.has_data(plot_id, *d))
    }
}

/// Source rectangle in screen coordinates (zoom-scaled pixels).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Blit the cached raw blocks covering `src` onto `dest`, scaled into the
/// `dest_x/dest_y/dest_w/dest_h` rectangle.
///
/// Sampling is nearest-neighbor: flux values are copied, never blended, so
/// the composited canvas stays photometrically meaningful. Output is
/// deterministic and idempotent. With nothing cached this is a no-op --
/// compositing never fetches or blocks.
#[allow(clippy::too_many_arguments)]
pub fn draw_screen_tile_to_main_canvas(
    cache: &RawTileCache,
    plot_id: PlotId,
    plot: &Plot,
    src: ScreenRect,
    dest: &mut RasterCanvas,
    dest_x: i32,
    dest_y: i32,
    dest_w: u32,
    dest_h: u32,
    zoom_override: Option<f64>,
) {
    if dest_w == 0 || dest_h == 0 || src.width <= 0.0 || src.height <= 0.0 {
        return;
    }
    let zoom = zoom_override.unwrap_or(plot.zoom_factor);
    let Some(decimation) = cache.choose_decimation(plot_id, zoom) else {
        return; // cache miss: best-effort no-op
    };
    let Some(blocks) = cache.blocks_for(plot_id, decimation) else {
        return;
    };

    // screen pixels per decimated raw pixel
    let scale = zoom * decimation.factor() as f64;

    // clip the destination rectangle to the canvas
    let x0 = dest_x.max(0) as usize;
    let y0 = dest_y.max(0) as usize;
    let x1 = ((dest_x + dest_w as i32).max(0) as usize).min(dest.width());
    let y1 = ((dest_y + dest_h as i32).max(0) as usize).min(dest.height());
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let canvas_width = dest.width();
    let sx_per_px = src.width / dest_w as f64;
    let sy_per_px = src.height / dest_h as f64;

    dest.data_mut()
        .par_chunks_mut(canvas_width)
        .enumerate()
        .filter(|(y, _)| *y >= y0 && *y < y1)
        .for_each(|(y, row)| {
            let sy = src.y + (y as f64 - dest_y as f64 + 0.5) * sy_per_px;
            let ry = sy / scale;
            if ry < 0.0 {
                return;
            }
            let ry = ry as u32;
            let by = ry / BLOCK_SIZE;
            let iy = ry % BLOCK_SIZE;
            for (x, px) in row.iter_mut().enumerate().take(x1).skip(x0) {
                let sx = src.x + (x as f64 - dest_x as f64 + 0.5) * sx_per_px;
                let rx = sx / scale;
                if rx < 0.0 {
                    continue;
                }
                let rx = rx as u32;
                let Some(block) = blocks.get(&(rx / BLOCK_SIZE, by)) else {
                    continue;
                };
                let ix = rx % BLOCK_SIZE;
                if ix < block.width && iy < block.height {
                    *px = block.pixels[(iy * block.width + ix) as usize];
                }
            }
        });
}

/// Composite the whole plot into a square thumbnail no larger than
/// `target_size` on a side, deriving a synthetic fit zoom and reusing the
/// main compositor.
pub fn make_thumbnail_canvas(
    cache: &RawTileCache,
    plot_id: PlotId,
    plot: &Plot,
    target_size: u32,
) -> RasterCanvas {
    let dw = plot.data_width.max(1) as f64;
    let dh = plot.data_height.max(1) as f64;
    let zoom = (target_size as f64 / dw).min(target_size as f64 / dh);
    let w = (dw * zoom).round().max(1.0) as u32;
    let h = (dh * zoom).round().max(1.0) as u32;
    let mut canvas = RasterCanvas::new(w as usize, h as usize);
    draw_screen_tile_to_main_canvas(
        cache,
        plot_id,
        plot,
        ScreenRect { x: 0.0, y: 0.0, width: dw * zoom, height: dh * zoom },
        &mut canvas,
        0,
        0,
        w,
        h,
        Some(zoom),
    );
    canvas
}
