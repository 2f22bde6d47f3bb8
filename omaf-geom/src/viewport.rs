// SPDX-License-Identifier: MIT
//! # Viewport Tile Selection
//!
//! Resolves a viewing direction into the set of source tiles visible inside
//! the field of view, for equirectangular and cubemap projections.
//!
//! ## Approach
//!
//! The viewport frustum is sampled on a fine angular grid: every sample
//! direction is rotated into the viewport's camera basis, projected back
//! onto the source picture (ERP longitude/latitude mapping, or dominant-axis
//! cube face mapping) and the tile under the resulting pixel is marked. The
//! sample grid is dense enough that a tile cannot fit between two adjacent
//! samples at the supported tile counts.
//!
//! The selector is stateful in the style of a codec session: `set_viewport`
//! then `process`, then read the selection and coverage. Selections come
//! back sorted by (face, tile index), which keeps the sweep deterministic
//! and reproducible across runs.

use std::collections::BTreeSet;

use anyhow::{bail, Result};

use crate::tiles::{Projection, TileDef, TileGridGeometry};

/// Samples per frustum axis. 65×65 rays per viewport keeps the largest
/// supported tile grids (16×16 per face) free of gaps while staying cheap
/// enough to sweep the whole sphere in milliseconds.
const FRUSTUM_SAMPLES: u32 = 65;

/// Content coverage of one viewport, in OMAF 16.16 fixed-point degrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoverageInfo {
    pub centre_azimuth: i32,
    pub centre_elevation: i32,
    pub azimuth_range: u32,
    pub elevation_range: u32,
}

/// Degrees to OMAF 16.16 fixed point.
fn to_fixed16(deg: f64) -> i32 {
    (deg * 65536.0).round() as i32
}

/// Viewport-math collaborator interface.
///
/// The planner drives any backend through this seam; [`SphereSampler`] is
/// the built-in one. All operations are synchronous.
pub trait ViewportMath {
    /// Point the viewport at (yaw, pitch), in degrees.
    fn set_viewport(&mut self, yaw: f32, pitch: f32) -> Result<()>;
    /// Resolve the current viewport into tiles and coverage.
    fn process(&mut self) -> Result<()>;
    /// Tiles intersected by the last processed viewport.
    fn tiles_in_viewport(&self) -> Result<&[TileDef]>;
    /// Coverage of the last processed viewport.
    fn content_coverage(&self) -> Result<CoverageInfo>;
}

/// Static configuration of a viewport selector.
#[derive(Clone, Copy, Debug)]
pub struct ViewportMathConfig {
    pub geometry: TileGridGeometry,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Horizontal field of view in degrees.
    pub fov_h: f32,
    /// Vertical field of view in degrees.
    pub fov_v: f32,
}

/// Built-in viewport-math backend.
pub struct SphereSampler {
    cfg: ViewportMathConfig,
    yaw: f64,
    pitch: f64,
    tiles: Vec<TileDef>,
    coverage: Option<CoverageInfo>,
}

impl SphereSampler {
    /// Create a selector for spherical content.
    ///
    /// Planar content has no sphere mapping and is rejected here; the
    /// packager skips viewport planning for it entirely.
    pub fn new(cfg: ViewportMathConfig) -> Result<Self> {
        if cfg.geometry.projection == Projection::Planar {
            bail!("planar content has no viewport mapping");
        }
        if cfg.geometry.cols == 0 || cfg.geometry.rows == 0 {
            bail!("tile grid must be non-empty");
        }
        if cfg.geometry.projection == Projection::Cubemap
            && (cfg.geometry.cols % 3 != 0 || cfg.geometry.rows % 2 != 0)
        {
            bail!(
                "cubemap tile grid {}x{} does not divide the 3x2 face mosaic",
                cfg.geometry.cols,
                cfg.geometry.rows
            );
        }
        if cfg.fov_h <= 0.0 || cfg.fov_h >= 180.0 || cfg.fov_v <= 0.0 || cfg.fov_v >= 180.0 {
            bail!("FOV must be within (0, 180) degrees");
        }
        Ok(Self {
            cfg,
            yaw: 0.0,
            pitch: 0.0,
            tiles: Vec::new(),
            coverage: None,
        })
    }

    fn sample_directions(&self) -> impl Iterator<Item = [f64; 3]> + '_ {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        // Camera basis: forward toward (yaw, pitch), right along the local
        // horizon, up completing the right-handed frame.
        let forward = [
            pitch.cos() * yaw.sin(),
            pitch.sin(),
            pitch.cos() * yaw.cos(),
        ];
        let right = [yaw.cos(), 0.0, -yaw.sin()];
        let up = cross(forward, right);
        let half_w = (self.cfg.fov_h as f64 / 2.0).to_radians().tan();
        let half_h = (self.cfg.fov_v as f64 / 2.0).to_radians().tan();

        (0..FRUSTUM_SAMPLES).flat_map(move |i| {
            (0..FRUSTUM_SAMPLES).map(move |j| {
                let a = (2.0 * i as f64 / (FRUSTUM_SAMPLES - 1) as f64 - 1.0) * half_w;
                let b = (2.0 * j as f64 / (FRUSTUM_SAMPLES - 1) as f64 - 1.0) * half_h;
                normalize([
                    forward[0] + a * right[0] + b * up[0],
                    forward[1] + a * right[1] + b * up[1],
                    forward[2] + a * right[2] + b * up[2],
                ])
            })
        })
    }

    fn tile_for_direction(&self, dir: [f64; 3]) -> TileDef {
        match self.cfg.geometry.projection {
            Projection::Erp => self.erp_tile(dir),
            Projection::Cubemap => self.cubemap_tile(dir),
            Projection::Planar => unreachable!("rejected in constructor"),
        }
    }

    fn erp_tile(&self, dir: [f64; 3]) -> TileDef {
        let g = &self.cfg.geometry;
        let azimuth = dir[0].atan2(dir[2]).to_degrees();
        let elevation = dir[1].clamp(-1.0, 1.0).asin().to_degrees();

        let u = (azimuth + 180.0) / 360.0;
        let v = (90.0 - elevation) / 180.0;
        let col = ((u * g.cols as f64) as i64).rem_euclid(g.cols as i64) as u8;
        let row = ((v * g.rows as f64) as u8).min(g.rows - 1);
        g.tile_at(0, row, col)
    }

    fn cubemap_tile(&self, dir: [f64; 3]) -> TileDef {
        let g = &self.cfg.geometry;
        let [x, y, z] = dir;
        let (ax, ay, az) = (x.abs(), y.abs(), z.abs());

        // Dominant axis picks the face; (sc, tc) are the in-face
        // coordinates before normalisation. Faces 0..5 = +X, -X, +Y, -Y,
        // +Z, -Z laid out row-major in the 3×2 mosaic.
        let (face, sc, tc, ma) = if ax >= ay && ax >= az {
            if x > 0.0 { (0u8, -z, -y, ax) } else { (1, z, -y, ax) }
        } else if ay >= ax && ay >= az {
            if y > 0.0 { (2, x, z, ay) } else { (3, x, -z, ay) }
        } else if z > 0.0 {
            (4, x, -y, az)
        } else {
            (5, -x, -y, az)
        };

        let u = ((sc / ma + 1.0) / 2.0).clamp(0.0, 1.0);
        let v = ((tc / ma + 1.0) / 2.0).clamp(0.0, 1.0);
        let col = ((u * g.face_cols() as f64) as u8).min(g.face_cols() - 1);
        let row = ((v * g.face_rows() as f64) as u8).min(g.face_rows() - 1);
        g.tile_at(face, row, col)
    }

    /// Tile-aligned coverage for ERP selections; the viewport FOV for
    /// cubemap, whose tile footprints have no single azimuth span.
    fn compute_coverage(&self, tiles: &BTreeSet<TileDef>) -> CoverageInfo {
        let g = &self.cfg.geometry;
        if g.projection == Projection::Cubemap || tiles.is_empty() {
            return CoverageInfo {
                centre_azimuth: to_fixed16(self.yaw),
                centre_elevation: to_fixed16(self.pitch),
                azimuth_range: to_fixed16(self.cfg.fov_h as f64) as u32,
                elevation_range: to_fixed16(self.cfg.fov_v as f64) as u32,
            };
        }

        let tw_deg = 360.0 / g.cols as f64;
        let th_deg = 180.0 / g.rows as f64;
        let (mut az_min, mut az_max) = (f64::MAX, f64::MIN);
        let (mut el_min, mut el_max) = (f64::MAX, f64::MIN);
        for t in tiles {
            // Azimuth bounds re-centred on the viewport yaw so that a
            // selection straddling the ±180 seam stays contiguous.
            let left = t.x as f64 / g.pic_width as f64 * 360.0 - 180.0;
            let left = centre_on(left, self.yaw);
            az_min = az_min.min(left);
            az_max = az_max.max(left + tw_deg);

            let top = 90.0 - t.y as f64 / g.pic_height as f64 * 180.0;
            el_max = el_max.max(top);
            el_min = el_min.min(top - th_deg);
        }

        let centre_az = wrap_azimuth((az_min + az_max) / 2.0);
        CoverageInfo {
            centre_azimuth: to_fixed16(centre_az),
            centre_elevation: to_fixed16((el_min + el_max) / 2.0),
            azimuth_range: to_fixed16((az_max - az_min).min(360.0)) as u32,
            elevation_range: to_fixed16((el_max - el_min).min(180.0)) as u32,
        }
    }
}

impl ViewportMath for SphereSampler {
    fn set_viewport(&mut self, yaw: f32, pitch: f32) -> Result<()> {
        if !(-180.0..=180.0).contains(&yaw) {
            bail!("yaw {yaw} out of [-180, 180]");
        }
        if !(-90.0..=90.0).contains(&pitch) {
            bail!("pitch {pitch} out of [-90, 90]");
        }
        self.yaw = yaw as f64;
        self.pitch = pitch as f64;
        self.coverage = None;
        self.tiles.clear();
        Ok(())
    }

    fn process(&mut self) -> Result<()> {
        let hits: BTreeSet<TileDef> = self
            .sample_directions()
            .map(|dir| self.tile_for_direction(dir))
            .collect();
        self.coverage = Some(self.compute_coverage(&hits));
        self.tiles = hits.into_iter().collect();
        Ok(())
    }

    fn tiles_in_viewport(&self) -> Result<&[TileDef]> {
        if self.coverage.is_none() {
            bail!("viewport not processed");
        }
        Ok(&self.tiles)
    }

    fn content_coverage(&self) -> Result<CoverageInfo> {
        self.coverage
            .ok_or_else(|| anyhow::anyhow!("viewport not processed"))
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    [v[0] / len, v[1] / len, v[2] / len]
}

/// Shift `azimuth` by whole turns until it lies within ±180° of `centre`.
fn centre_on(azimuth: f64, centre: f64) -> f64 {
    let mut a = azimuth;
    while a < centre - 180.0 {
        a += 360.0;
    }
    while a > centre + 180.0 {
        a -= 360.0;
    }
    a
}

fn wrap_azimuth(azimuth: f64) -> f64 {
    let mut a = azimuth;
    while a > 180.0 {
        a -= 360.0;
    }
    while a < -180.0 {
        a += 360.0;
    }
    a
}
