// SPDX-License-Identifier: MIT
//! # Tile Grid Model
//!
//! Tile references and grid arithmetic shared by the viewport selector and
//! the packed-layout generator.
//!
//! A source picture is divided into a uniform grid of HEVC tiles. For
//! equirectangular and planar content the picture is a single face (face 0);
//! cubemap content is a 3×2 face mosaic with faces numbered 0..5 row-major,
//! each face carrying its own uniform tile grid.

use serde::{Deserialize, Serialize};

/// Projection format of the source video.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Projection {
    /// Equirectangular projection, one face covering the full sphere.
    Erp,
    /// Cubemap projection, six faces in a 3×2 mosaic.
    Cubemap,
    /// Flat 2D content; no sphere mapping applies.
    Planar,
}

impl Projection {
    /// OMAF projection_type value carried in the MPD projection descriptor.
    pub fn omaf_projection_type(self) -> u8 {
        match self {
            Projection::Erp => 0,
            Projection::Cubemap => 1,
            Projection::Planar => 2,
        }
    }
}

/// Reference to one tile of the source picture.
///
/// Identity of two tiles is the full tuple (face_id, idx, x, y); the
/// selection registry and the duplicate-selection check depend on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileDef {
    /// Face the tile belongs to: 0 for ERP/planar, 0..5 for cubemap.
    pub face_id: u8,
    /// Tile index inside its face, row-major.
    pub idx: u16,
    /// Top-left x of the tile in source picture coordinates.
    pub x: u32,
    /// Top-left y of the tile in source picture coordinates.
    pub y: u32,
}

/// Rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Uniform tile grid over one source layer.
///
/// `cols`/`rows` count tiles across the whole picture. For cubemap layers
/// they must be divisible by the 3×2 face mosaic so that every face carries
/// the same per-face grid.
#[derive(Clone, Copy, Debug)]
pub struct TileGridGeometry {
    pub pic_width: u32,
    pub pic_height: u32,
    pub cols: u8,
    pub rows: u8,
    pub projection: Projection,
}

impl TileGridGeometry {
    /// Width of one tile in luma samples.
    pub fn tile_width(&self) -> u32 {
        self.pic_width / self.cols as u32
    }

    /// Height of one tile in luma samples.
    pub fn tile_height(&self) -> u32 {
        self.pic_height / self.rows as u32
    }

    /// Total tile count across all faces.
    pub fn tile_count(&self) -> u32 {
        self.cols as u32 * self.rows as u32
    }

    /// Per-face tile columns (same as `cols` outside cubemap).
    pub fn face_cols(&self) -> u8 {
        match self.projection {
            Projection::Cubemap => self.cols / 3,
            _ => self.cols,
        }
    }

    /// Per-face tile rows (same as `rows` outside cubemap).
    pub fn face_rows(&self) -> u8 {
        match self.projection {
            Projection::Cubemap => self.rows / 2,
            _ => self.rows,
        }
    }

    /// Face width in luma samples.
    pub fn face_width(&self) -> u32 {
        match self.projection {
            Projection::Cubemap => self.pic_width / 3,
            _ => self.pic_width,
        }
    }

    /// Face height in luma samples.
    pub fn face_height(&self) -> u32 {
        match self.projection {
            Projection::Cubemap => self.pic_height / 2,
            _ => self.pic_height,
        }
    }

    /// Top-left of a cubemap face inside the 3×2 mosaic (faces row-major).
    pub fn face_origin(&self, face_id: u8) -> (u32, u32) {
        match self.projection {
            Projection::Cubemap => {
                let col = (face_id % 3) as u32;
                let row = (face_id / 3) as u32;
                (col * self.face_width(), row * self.face_height())
            }
            _ => (0, 0),
        }
    }

    /// Build the [`TileDef`] for a (face, in-face row, in-face col) triple.
    pub fn tile_at(&self, face_id: u8, row: u8, col: u8) -> TileDef {
        let (ox, oy) = self.face_origin(face_id);
        let tw = self.face_width() / self.face_cols() as u32;
        let th = self.face_height() / self.face_rows() as u32;
        TileDef {
            face_id,
            idx: row as u16 * self.face_cols() as u16 + col as u16,
            x: ox + col as u32 * tw,
            y: oy + row as u32 * th,
        }
    }

    /// Source rectangle of a tile, in picture coordinates.
    pub fn tile_rect(&self, tile: &TileDef) -> Rect {
        let tw = self.face_width() / self.face_cols() as u32;
        let th = self.face_height() / self.face_rows() as u32;
        Rect {
            x: tile.x,
            y: tile.y,
            w: tw,
            h: th,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn erp_grid() -> TileGridGeometry {
        TileGridGeometry {
            pic_width: 3840,
            pic_height: 1920,
            cols: 6,
            rows: 4,
            projection: Projection::Erp,
        }
    }

    #[test]
    fn erp_tile_geometry() {
        let g = erp_grid();
        assert_eq!(g.tile_width(), 640);
        assert_eq!(g.tile_height(), 480);
        assert_eq!(g.tile_count(), 24);

        let t = g.tile_at(0, 2, 3);
        assert_eq!(t.idx, 2 * 6 + 3);
        assert_eq!((t.x, t.y), (1920, 960));
        assert_eq!(g.tile_rect(&t), Rect { x: 1920, y: 960, w: 640, h: 480 });
    }

    #[test]
    fn cubemap_face_mosaic() {
        let g = TileGridGeometry {
            pic_width: 3072,
            pic_height: 2048,
            cols: 6,
            rows: 4,
            projection: Projection::Cubemap,
        };
        assert_eq!(g.face_width(), 1024);
        assert_eq!(g.face_height(), 1024);
        assert_eq!(g.face_cols(), 2);
        assert_eq!(g.face_rows(), 2);
        assert_eq!(g.face_origin(0), (0, 0));
        assert_eq!(g.face_origin(2), (2048, 0));
        assert_eq!(g.face_origin(4), (1024, 1024));

        // In-face index stays local while x/y carry the mosaic offset.
        let t = g.tile_at(4, 1, 0);
        assert_eq!(t.idx, 2);
        assert_eq!((t.x, t.y), (1024, 1536));
    }

    #[test]
    fn tile_identity_is_full_tuple() {
        let a = TileDef { face_id: 0, idx: 3, x: 1920, y: 0 };
        let b = TileDef { face_id: 0, idx: 3, x: 1920, y: 0 };
        let c = TileDef { face_id: 1, idx: 3, x: 1920, y: 0 };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
