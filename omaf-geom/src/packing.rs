// SPDX-License-Identifier: MIT
//! # Packed Sub-Picture Layout
//!
//! Arranges a regularised tile selection into the packed picture decoded by
//! one extractor track. Tiles are grouped into merged columns: the selection
//! is split into `cols` columns of `rows` tiles each (`cols` is the reduced
//! square root of the cardinality, so `cols ≤ rows` and the picture is
//! near-square), tiles stack vertically inside a column and columns
//! concatenate horizontally.
//!
//! The packed picture dimensions are rounded up to whole CTUs; the merged
//! tile grid handed to the PPS rewriter absorbs the rounding in its last
//! column and row, the way an HEVC tile grid carries picture remainders.

use anyhow::{bail, Result};

use crate::regularise::reduced_sqrt;
use crate::tiles::Rect;

/// HEVC coding tree unit size the packed picture is aligned to.
pub const CTU_SIZE: u32 = 64;

/// Round up to the next CTU multiple.
pub fn round_up_to_ctu(v: u32) -> u32 {
    v.div_ceil(CTU_SIZE) * CTU_SIZE
}

/// Rotation applied to a region when mapped into the packed picture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

/// One region of the packed picture: where it comes from and where it lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionMapping {
    pub src: Rect,
    pub dst: Rect,
    pub rotation: Rotation,
}

/// Merged tile grid of the packed picture, in luma samples.
///
/// This is the grid the rewritten PPS advertises. Widths and heights are
/// uniform except possibly the last column/row, which absorb CTU rounding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedTileGrid {
    pub col_widths: Vec<u32>,
    pub row_heights: Vec<u32>,
}

impl MergedTileGrid {
    pub fn cols(&self) -> usize {
        self.col_widths.len()
    }

    pub fn rows(&self) -> usize {
        self.row_heights.len()
    }

    pub fn packed_width(&self) -> u32 {
        self.col_widths.iter().sum()
    }

    pub fn packed_height(&self) -> u32 {
        self.row_heights.iter().sum()
    }

    /// True when every column width and every row height is identical, so
    /// the PPS can use uniform spacing instead of explicit sizes.
    pub fn is_uniform(&self) -> bool {
        self.col_widths.windows(2).all(|w| w[0] == w[1])
            && self.row_heights.windows(2).all(|h| h[0] == h[1])
    }
}

/// How merged tiles are concatenated inside the packed picture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeDirection {
    /// Tiles stack along columns; columns concatenate along rows.
    Col,
    /// Tiles run along rows; rows stack vertically.
    Row,
}

/// Concatenation plan for the segmenter: selection indices grouped into the
/// merged columns they stack in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilesMergeDirection {
    pub direction: MergeDirection,
    pub columns: Vec<Vec<usize>>,
}

/// Complete packed layout for one selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedLayout {
    pub packed_width: u32,
    pub packed_height: u32,
    pub regions: Vec<RegionMapping>,
    pub grid: MergedTileGrid,
    pub merge: TilesMergeDirection,
}

/// Build the merged-column layout for `src_rects`, the source rectangles of
/// the selection in order (duplicates included).
///
/// All rects must share one tile size; a mixed-size selection is the
/// business of a dedicated packing backend, not of this arrangement.
pub fn column_layout(src_rects: &[Rect]) -> Result<PackedLayout> {
    let n = src_rects.len();
    if n == 0 {
        bail!("empty selection");
    }
    let tile_w = src_rects[0].w;
    let tile_h = src_rects[0].h;
    if src_rects.iter().any(|r| r.w != tile_w || r.h != tile_h) {
        bail!("selection mixes tile sizes");
    }

    let cols = reduced_sqrt(n);
    let rows = n / cols;
    if cols * rows != n {
        bail!("cardinality {n} does not factorise as {cols}x{rows}");
    }

    let packed_width = round_up_to_ctu(cols as u32 * tile_w);
    let packed_height = round_up_to_ctu(rows as u32 * tile_h);

    let mut col_widths = vec![tile_w; cols];
    *col_widths.last_mut().expect("cols >= 1") += packed_width - cols as u32 * tile_w;
    let mut row_heights = vec![tile_h; rows];
    *row_heights.last_mut().expect("rows >= 1") += packed_height - rows as u32 * tile_h;

    let mut regions = Vec::with_capacity(n);
    let mut columns = vec![Vec::with_capacity(rows); cols];
    for (i, src) in src_rects.iter().enumerate() {
        let col = i / rows;
        let row = i % rows;
        regions.push(RegionMapping {
            src: *src,
            dst: Rect {
                x: col as u32 * tile_w,
                y: row as u32 * tile_h,
                w: tile_w,
                h: tile_h,
            },
            rotation: Rotation::None,
        });
        columns[col].push(i);
    }

    Ok(PackedLayout {
        packed_width,
        packed_height,
        regions,
        grid: MergedTileGrid { col_widths, row_heights },
        merge: TilesMergeDirection { direction: MergeDirection::Col, columns },
    })
}
