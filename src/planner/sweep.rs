//! # Viewport Sweep
//!
//! Walks the sphere on a fixed yaw/pitch grid, resolves each viewing
//! direction into a tile selection through the viewport-math backend, pads
//! it to a stitchable cardinality and stores the distinct results. The
//! sweep assigns viewport ids in walk order (yaw outer, pitch inner, both
//! ascending); downstream track numbering and the test suite depend on that
//! order being reproducible.

use std::collections::{BTreeMap, HashSet};

use log::{info, warn};
use omaf_geom::regularise::{regularise, MAX_FACTOR_SPREAD};
use omaf_geom::tiles::{TileDef, TileGridGeometry};
use omaf_geom::viewport::{CoverageInfo, ViewportMath};

use crate::error::{PackerError, PackerResult};

/// Sweep step along yaw, in degrees.
pub const YAW_STEP_DEG: i32 = 15;
/// Sweep step along pitch, in degrees.
pub const PITCH_STEP_DEG: i32 = 15;

/// One accepted selection: the tiles, their coverage, and the viewport that
/// first produced them.
#[derive(Clone, Debug)]
pub struct SelectionRecord {
    pub viewport_id: u16,
    pub selection: Vec<TileDef>,
    pub coverage: CoverageInfo,
    /// Duplicates appended by aspect regularisation.
    pub padded: usize,
}

/// Everything the sweep produced, grouped by selection cardinality.
#[derive(Clone, Debug, Default)]
pub struct SweepOutcome {
    pub selections: BTreeMap<u16, Vec<SelectionRecord>>,
    pub viewport_count: u16,
}

impl SweepOutcome {
    /// Largest selection cardinality observed.
    pub fn max_selection(&self) -> u16 {
        self.selections.keys().next_back().copied().unwrap_or(0)
    }

    pub fn distinct_selection_count(&self) -> usize {
        self.selections.values().map(Vec::len).sum()
    }

    /// Records in emission order: cardinality ascending, then viewport id.
    pub fn records(&self) -> impl Iterator<Item = (u16, &SelectionRecord)> {
        self.selections
            .iter()
            .flat_map(|(n, records)| records.iter().map(move |r| (*n, r)))
    }
}

/// The viewport sweeper. Borrows the viewport-math backend; never owns or
/// closes it.
pub struct ViewportSweeper<'a, V: ViewportMath> {
    math: &'a mut V,
    geometry: TileGridGeometry,
}

impl<'a, V: ViewportMath> ViewportSweeper<'a, V> {
    pub fn new(math: &'a mut V, geometry: TileGridGeometry) -> Self {
        Self { math, geometry }
    }

    /// Walk the whole sphere and collect distinct selections.
    pub fn sweep(&mut self) -> PackerResult<SweepOutcome> {
        let mut outcome = SweepOutcome::default();
        let mut yaw = -180;
        while yaw <= 180 {
            let mut pitch = -90;
            while pitch <= 90 {
                self.select_tiles_in_view(yaw as f32, pitch as f32, &mut outcome)?;
                pitch += PITCH_STEP_DEG;
            }
            yaw += YAW_STEP_DEG;
        }

        info!(
            "viewport sweep: {} viewports, {} distinct selections, max cardinality {}",
            outcome.viewport_count,
            outcome.distinct_selection_count(),
            outcome.max_selection()
        );
        Ok(outcome)
    }

    /// Resolve one viewing direction and store its selection unless an
    /// equal selection of the same cardinality already exists.
    pub fn select_tiles_in_view(
        &mut self,
        yaw: f32,
        pitch: f32,
        outcome: &mut SweepOutcome,
    ) -> PackerResult<()> {
        if !(-180.0..=180.0).contains(&yaw) || !(-90.0..=90.0).contains(&pitch) {
            return Err(PackerError::invalid_viewport(yaw, pitch));
        }

        self.math
            .set_viewport(yaw, pitch)
            .map_err(|err| PackerError::viewport_math("set_viewport", err.to_string()))?;
        self.math
            .process()
            .map_err(|err| PackerError::viewport_math("process", err.to_string()))?;
        let raw = self
            .math
            .tiles_in_viewport()
            .map_err(|err| PackerError::viewport_math("tiles_in_viewport", err.to_string()))?;

        let total_tiles = self.geometry.tile_count() as usize;
        if raw.is_empty() || raw.len() > total_tiles {
            return Err(PackerError::viewport_math(
                "tiles_in_viewport",
                format!(
                    "unreasonable selection of {} tiles out of {total_tiles}",
                    raw.len()
                ),
            ));
        }

        let mut selection = raw.to_vec();
        let plan = regularise(selection.len());
        for &src in &plan.appends_from_head {
            let dup = selection[src];
            selection.push(dup);
        }
        let padded = plan.appends_from_head.len();
        if padded > MAX_FACTOR_SPREAD {
            warn!(
                "viewport (yaw {yaw}, pitch {pitch}): supplemented {padded} tiles \
                 to reach a stitchable {}-tile grid",
                plan.n
            );
        }

        let coverage = self
            .math
            .content_coverage()
            .map_err(|err| PackerError::viewport_math("content_coverage", err.to_string()))?;

        let n = selection.len() as u16;
        let group = outcome.selections.entry(n).or_default();
        if differs_from_all(&selection, group) {
            group.push(SelectionRecord {
                viewport_id: outcome.viewport_count,
                selection,
                coverage,
                padded,
            });
            outcome.viewport_count += 1;
        }
        // A rejected duplicate is dropped here, releasing it immediately.
        Ok(())
    }
}

/// A candidate is kept only when, against every stored selection of the same
/// cardinality, it has at least one tile the stored one lacks.
fn differs_from_all(candidate: &[TileDef], stored: &[SelectionRecord]) -> bool {
    stored.iter().all(|record| {
        let theirs: HashSet<&TileDef> = record.selection.iter().collect();
        candidate.iter().any(|tile| !theirs.contains(tile))
    })
}
