//! # Extractor Track Planner
//!
//! The planning core of the packager. `initialize` sweeps the sphere once,
//! collects every distinct tile selection, and builds one packing generator
//! per selection cardinality; `generate_extractor_tracks` then assembles a
//! complete [`ExtractorTrack`] for every stored viewport.
//!
//! ## Lifecycle
//!
//! Selections, coverages and generators are created during initialisation
//! and outlive every extractor track. Track generation can run repeatedly
//! against the same plan. Generation is atomic: if any track fails, the
//! whole batch is discarded and the first error propagates — callers never
//! observe a partial map.

pub mod rwpk;
pub mod sweep;
pub mod track;

use std::collections::BTreeMap;

use log::{debug, info};
use omaf_geom::viewport::{SphereSampler, ViewportMath, ViewportMathConfig};
use omaf_geom::Projection;
use omaf_hevc::{generate_pps, generate_sps, TileGrid};

use crate::config::PackerConfig;
use crate::error::{PackerError, PackerResult};
use crate::streams::StreamSet;

use rwpk::{create_packing_generator, PackingGenerator};
use sweep::{SweepOutcome, ViewportSweeper};
use track::{ContentCoverage, ExtractorTrack};

/// Parameter-set rewrites go through a caller-owned buffer of this size,
/// matching the contract of the rewriter.
const PARAM_SET_BUFFER: usize = 1024;

/// The extractor-track planner.
#[derive(Debug)]
pub struct ExtractorTrackPlanner<'a> {
    streams: &'a StreamSet,
    config: &'a PackerConfig,
    outcome: SweepOutcome,
    generators: BTreeMap<u16, Box<dyn PackingGenerator>>,
}

impl<'a> ExtractorTrackPlanner<'a> {
    /// Sweep the sphere and prepare one packing generator per selection
    /// cardinality.
    ///
    /// The viewport-math backend is built from the main layer's geometry;
    /// planar content has no viewport mapping and is rejected.
    pub fn initialize(streams: &'a StreamSet, config: &'a PackerConfig) -> PackerResult<Self> {
        if streams.projection() == Projection::Planar {
            return Err(PackerError::viewport_math(
                "initialize",
                "planar content has no viewport sweep",
            ));
        }

        let mut math = SphereSampler::new(ViewportMathConfig {
            geometry: streams.main_geometry(),
            viewport_width: config.viewport.width,
            viewport_height: config.viewport.height,
            fov_h: config.viewport.fov_h,
            fov_v: config.viewport.fov_v,
        })
        .map_err(|err| PackerError::viewport_math("initialize", err.to_string()))?;

        Self::initialize_with(streams, config, &mut math)
    }

    /// Like [`ExtractorTrackPlanner::initialize`], but sweeping through a
    /// caller-supplied viewport-math backend.
    pub fn initialize_with<V: ViewportMath>(
        streams: &'a StreamSet,
        config: &'a PackerConfig,
        math: &mut V,
    ) -> PackerResult<Self> {
        let outcome = ViewportSweeper::new(math, streams.main_geometry()).sweep()?;
        if outcome.selections.is_empty() {
            return Err(PackerError::viewport_math(
                "sweep",
                "sweep produced no selections",
            ));
        }

        let max_selection = outcome.max_selection();
        let mut generators: BTreeMap<u16, Box<dyn PackingGenerator>> = BTreeMap::new();
        for &n in outcome.selections.keys() {
            let canvas = if config.fixed_packed_pic_res { max_selection } else { n };
            let generator =
                create_packing_generator(&config.packing_plugin, streams, n, canvas)?;
            generators.insert(n, generator);
        }

        info!(
            "planner initialised: {} selection sizes, largest {}",
            generators.len(),
            max_selection
        );
        Ok(Self { streams, config, outcome, generators })
    }

    /// The sweep result, for inspection and tests.
    pub fn outcome(&self) -> &SweepOutcome {
        &self.outcome
    }

    pub fn viewport_count(&self) -> u16 {
        self.outcome.viewport_count
    }

    /// Assemble every stored viewport into an extractor track.
    ///
    /// Tracks come back keyed by viewport id, assembled in selection-size
    /// ascending order then viewport order. On failure nothing is returned:
    /// the partially built batch is dropped wholesale.
    pub fn generate_extractor_tracks(&mut self) -> PackerResult<BTreeMap<u16, ExtractorTrack>> {
        let main = self.streams.main_layer();
        let layer_resolutions = self.streams.layer_resolutions();
        let projection = self.streams.projection();

        let mut tracks = BTreeMap::new();
        for (n, record) in self.outcome.records() {
            let generator = self
                .generators
                .get_mut(&n)
                .ok_or_else(|| PackerError::plugin(&self.config.packing_plugin, "no generator for cardinality"))?;

            generator.generate_merged_tiles_arrange(&record.selection)?;
            let rwpk = generator.generate_dst_rwpk(&record.selection)?;
            let merge = generator.generate_tiles_merge_direction(&record.selection)?;
            let grid = generator
                .merged_tiles_arrange()
                .ok_or_else(|| PackerError::plugin(&self.config.packing_plugin, "no merged arrangement"))?;
            let packed_width = rwpk.packed_pic_width;
            let packed_height = rwpk.packed_pic_height;

            let mut sps_buf = vec![0u8; PARAM_SET_BUFFER];
            let sps_len = generate_sps(&main.sps, packed_width, packed_height, &mut sps_buf)?;
            sps_buf.truncate(sps_len);

            let tile_grid = TileGrid {
                col_widths: grid.col_widths.clone(),
                row_heights: grid.row_heights.clone(),
            };
            let mut pps_buf = vec![0u8; PARAM_SET_BUFFER];
            let pps_len = generate_pps(&main.pps, &tile_grid, &mut pps_buf)?;
            pps_buf.truncate(pps_len);

            debug!(
                "viewport {}: {} tiles packed to {}x{}",
                record.viewport_id,
                record.selection.len(),
                packed_width,
                packed_height
            );

            tracks.insert(
                record.viewport_id,
                ExtractorTrack {
                    viewport_id: record.viewport_id,
                    projection,
                    selection: record.selection.clone(),
                    rwpk,
                    coverage: ContentCoverage::from_viewport(projection, &record.coverage),
                    merge,
                    packed_width,
                    packed_height,
                    vps: main.vps.clone(),
                    sps: sps_buf,
                    pps: pps_buf,
                    layer_resolutions: layer_resolutions.clone(),
                },
            );
        }
        Ok(tracks)
    }
}
