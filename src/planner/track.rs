//! # Extractor Track Model
//!
//! The assembled description of one playable viewport: which tiles it
//! stitches, how they pack, what part of the sphere they cover, and the
//! rewritten parameter sets its samples decode with. Instances are built by
//! the planner and handed to the segmenter and the MPD writer; they own
//! their parameter-set buffers.

use omaf_geom::packing::TilesMergeDirection;
use omaf_geom::tiles::TileDef;
use omaf_geom::viewport::CoverageInfo;
use omaf_geom::Projection;

use crate::planner::rwpk::RegionWisePacking;

/// One sphere region of a content-coverage record, in 16.16 degrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SphereRegion {
    pub view_idc: u8,
    pub centre_azimuth: i32,
    pub centre_elevation: i32,
    pub centre_tilt: i32,
    pub azimuth_range: u32,
    pub elevation_range: u32,
    pub interpolate: bool,
}

/// OMAF content coverage attached to one extractor track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentCoverage {
    /// 1 for equirectangular content, 0 for cubemap.
    pub shape_type: u8,
    pub view_idc_presence: bool,
    pub default_view_idc: u8,
    pub regions: Vec<SphereRegion>,
}

impl ContentCoverage {
    /// Single-region coverage in the shape the projection dictates.
    pub fn from_viewport(projection: Projection, coverage: &CoverageInfo) -> Self {
        let shape_type = match projection {
            Projection::Erp => 1,
            _ => 0,
        };
        Self {
            shape_type,
            view_idc_presence: false,
            default_view_idc: 0,
            regions: vec![SphereRegion {
                view_idc: 0,
                centre_azimuth: coverage.centre_azimuth,
                centre_elevation: coverage.centre_elevation,
                centre_tilt: 0,
                azimuth_range: coverage.azimuth_range,
                elevation_range: coverage.elevation_range,
                interpolate: false,
            }],
        }
    }
}

/// One playable viewport, fully assembled.
#[derive(Clone, Debug)]
pub struct ExtractorTrack {
    pub viewport_id: u16,
    pub projection: Projection,
    /// The stitched tiles, duplicates from regularisation included.
    pub selection: Vec<TileDef>,
    pub rwpk: RegionWisePacking,
    pub coverage: ContentCoverage,
    pub merge: TilesMergeDirection,
    pub packed_width: u32,
    pub packed_height: u32,
    /// Start-coded parameter sets: the main layer's VPS reused, the SPS and
    /// PPS newly emitted for the packed picture.
    pub vps: Vec<u8>,
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
    /// Resolutions of every source layer, main layer first.
    pub layer_resolutions: Vec<(u32, u32)>,
}
