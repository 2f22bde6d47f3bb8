//! # Region-Wise Packing Generation
//!
//! The mapping from a tile selection to the packed picture is pluggable:
//! backends register by name and the planner resolves one per selection
//! cardinality. A backend owns the whole packing decision — region list,
//! merged tile grid, merge direction, packed dimensions — and the planner
//! treats it as opaque as long as it honours the contract below.
//!
//! The built-in `"column"` backend packs the selection into merged columns
//! at the main layer's tile resolution; under fixed packed resolution it is
//! initialised with the sweep's largest cardinality and fills the spare
//! cells with repeats of the selection head, so every extractor track
//! shares one packed picture size.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use omaf_geom::packing::{column_layout, MergedTileGrid, PackedLayout, TilesMergeDirection};
use omaf_geom::tiles::{Rect, TileDef, TileGridGeometry};

use crate::error::{PackerError, PackerResult};
use crate::streams::StreamSet;

/// Packed pictures wider or taller than this exceed the HEVC level budget
/// the packager targets.
pub const MAX_PACKED_DIMENSION: u32 = 8192;

/// One region of the region-wise packing record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedRegion {
    /// Source rectangle in the projected picture.
    pub proj: Rect,
    /// Destination rectangle in the packed picture.
    pub packed: Rect,
    /// OMAF transform type; 0 is identity, rotations per the OMAF table.
    pub transform: u8,
}

/// OMAF region-wise packing record attached to one extractor track.
/// Guard bands are never emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionWisePacking {
    pub proj_pic_width: u32,
    pub proj_pic_height: u32,
    pub packed_pic_width: u32,
    pub packed_pic_height: u32,
    pub regions: Vec<PackedRegion>,
}

/// A packing backend bound to one selection cardinality.
pub trait PackingGenerator: Send + std::fmt::Debug {
    /// Compute the merged arrangement for a selection. Must run before the
    /// other generation calls of a viewport.
    fn generate_merged_tiles_arrange(&mut self, selection: &[TileDef]) -> PackerResult<()>;

    /// The region-wise packing record for the arranged selection.
    fn generate_dst_rwpk(&mut self, selection: &[TileDef]) -> PackerResult<RegionWisePacking>;

    /// The tile concatenation plan for the segmenter.
    fn generate_tiles_merge_direction(
        &self,
        selection: &[TileDef],
    ) -> PackerResult<TilesMergeDirection>;

    fn packed_pic_width(&self) -> u32;
    fn packed_pic_height(&self) -> u32;

    /// The merged tile grid of the last arrangement, for PPS rewriting.
    fn merged_tiles_arrange(&self) -> Option<&MergedTileGrid>;
}

/// Creates generators for a named backend.
pub trait PackingGeneratorFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build a generator for selections of `n_this` tiles, packing onto a
    /// canvas sized for `n_max` (equal outside fixed-resolution mode).
    fn create(
        &self,
        streams: &StreamSet,
        n_this: u16,
        n_max: u16,
    ) -> PackerResult<Box<dyn PackingGenerator>>;
}

static REGISTRY: Lazy<RwLock<HashMap<&'static str, Arc<dyn PackingGeneratorFactory>>>> =
    Lazy::new(|| {
        let mut backends: HashMap<&'static str, Arc<dyn PackingGeneratorFactory>> = HashMap::new();
        let column = Arc::new(ColumnPackingFactory);
        backends.insert(column.name(), column);
        RwLock::new(backends)
    });

/// Register a packing backend under its name, replacing any previous one.
pub fn register_packing_generator(factory: Arc<dyn PackingGeneratorFactory>) {
    REGISTRY
        .write()
        .expect("packing registry poisoned")
        .insert(factory.name(), factory);
}

/// Resolve a backend by name and build a generator from it.
pub fn create_packing_generator(
    name: &str,
    streams: &StreamSet,
    n_this: u16,
    n_max: u16,
) -> PackerResult<Box<dyn PackingGenerator>> {
    let factory = REGISTRY
        .read()
        .expect("packing registry poisoned")
        .get(name)
        .cloned()
        .ok_or_else(|| PackerError::plugin(name, "no such packing generator registered"))?;
    factory.create(streams, n_this, n_max)
}

/// Factory for the built-in merged-column backend.
pub struct ColumnPackingFactory;

impl PackingGeneratorFactory for ColumnPackingFactory {
    fn name(&self) -> &'static str {
        "column"
    }

    fn create(
        &self,
        streams: &StreamSet,
        n_this: u16,
        n_max: u16,
    ) -> PackerResult<Box<dyn PackingGenerator>> {
        if n_this == 0 {
            return Err(PackerError::plugin(self.name(), "empty selection size"));
        }
        if n_this > n_max {
            return Err(PackerError::plugin(
                self.name(),
                format!("selection size {n_this} exceeds canvas size {n_max}"),
            ));
        }
        Ok(Box::new(ColumnPackingGenerator {
            geometry: streams.main_geometry(),
            n_this,
            n_max,
            layout: None,
        }))
    }
}

/// Built-in backend: merged columns at main-layer tile resolution.
#[derive(Debug)]
pub struct ColumnPackingGenerator {
    geometry: TileGridGeometry,
    n_this: u16,
    n_max: u16,
    layout: Option<PackedLayout>,
}

impl ColumnPackingGenerator {
    fn arranged(&self) -> PackerResult<&PackedLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| PackerError::plugin("column", "merged arrangement not generated yet"))
    }
}

impl PackingGenerator for ColumnPackingGenerator {
    fn generate_merged_tiles_arrange(&mut self, selection: &[TileDef]) -> PackerResult<()> {
        if selection.len() != self.n_this as usize {
            return Err(PackerError::plugin(
                "column",
                format!(
                    "selection of {} tiles incompatible with generator for {}",
                    selection.len(),
                    self.n_this
                ),
            ));
        }

        // Fixed-resolution canvases are filled to n_max with further
        // repeats of the selection head; duplicate regions are legal.
        let mut srcs: Vec<Rect> = selection
            .iter()
            .map(|tile| self.geometry.tile_rect(tile))
            .collect();
        for i in selection.len()..self.n_max as usize {
            srcs.push(srcs[i % selection.len()]);
        }

        let layout = column_layout(&srcs).map_err(|err| PackerError::layout(err.to_string()))?;
        if layout.packed_width > MAX_PACKED_DIMENSION
            || layout.packed_height > MAX_PACKED_DIMENSION
        {
            return Err(PackerError::layout(format!(
                "packed picture {}x{} exceeds the {MAX_PACKED_DIMENSION} level limit",
                layout.packed_width, layout.packed_height
            )));
        }
        self.layout = Some(layout);
        Ok(())
    }

    fn generate_dst_rwpk(&mut self, _selection: &[TileDef]) -> PackerResult<RegionWisePacking> {
        let layout = self.arranged()?;
        Ok(RegionWisePacking {
            proj_pic_width: self.geometry.pic_width,
            proj_pic_height: self.geometry.pic_height,
            packed_pic_width: layout.packed_width,
            packed_pic_height: layout.packed_height,
            regions: layout
                .regions
                .iter()
                .map(|region| PackedRegion {
                    proj: region.src,
                    packed: region.dst,
                    transform: 0,
                })
                .collect(),
        })
    }

    fn generate_tiles_merge_direction(
        &self,
        _selection: &[TileDef],
    ) -> PackerResult<TilesMergeDirection> {
        Ok(self.arranged()?.merge.clone())
    }

    fn packed_pic_width(&self) -> u32 {
        self.layout.as_ref().map_or(0, |l| l.packed_width)
    }

    fn packed_pic_height(&self) -> u32 {
        self.layout.as_ref().map_or(0, |l| l.packed_height)
    }

    fn merged_tiles_arrange(&self) -> Option<&MergedTileGrid> {
        self.layout.as_ref().map(|l| &l.grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::tests_support::erp_stream_set;

    fn selection(geometry: &TileGridGeometry, ids: &[u16]) -> Vec<TileDef> {
        ids.iter()
            .map(|&idx| {
                geometry.tile_at(0, (idx / geometry.cols as u16) as u8, (idx % geometry.cols as u16) as u8)
            })
            .collect()
    }

    #[test]
    fn unknown_backend_is_a_plugin_failure() {
        let streams = erp_stream_set();
        let err = create_packing_generator("mosaic", &streams, 6, 6).unwrap_err();
        assert_eq!(err.kind(), "plugin_failure");
    }

    #[test]
    fn column_backend_fills_rwpk() {
        let streams = erp_stream_set();
        let geometry = streams.main_geometry();
        let mut generator = create_packing_generator("column", &streams, 6, 6).unwrap();
        let tiles = selection(&geometry, &[0, 1, 2, 6, 7, 8]);

        generator.generate_merged_tiles_arrange(&tiles).unwrap();
        let rwpk = generator.generate_dst_rwpk(&tiles).unwrap();
        assert_eq!(rwpk.proj_pic_width, 3840);
        assert_eq!(rwpk.proj_pic_height, 1920);
        assert_eq!(rwpk.regions.len(), 6);
        assert_eq!(rwpk.packed_pic_width, generator.packed_pic_width());
        assert!(rwpk.regions.iter().all(|r| r.transform == 0));

        let merge = generator.generate_tiles_merge_direction(&tiles).unwrap();
        assert_eq!(merge.columns.len(), 2);
    }

    #[test]
    fn fixed_resolution_canvas_pads_with_head_repeats() {
        let streams = erp_stream_set();
        let geometry = streams.main_geometry();
        let mut generator = create_packing_generator("column", &streams, 4, 9).unwrap();
        let tiles = selection(&geometry, &[0, 1, 6, 7]);

        generator.generate_merged_tiles_arrange(&tiles).unwrap();
        let rwpk = generator.generate_dst_rwpk(&tiles).unwrap();
        assert_eq!(rwpk.regions.len(), 9);
        // Region 4 repeats the selection head's source rect.
        assert_eq!(rwpk.regions[4].proj, rwpk.regions[0].proj);
        assert_ne!(rwpk.regions[4].packed, rwpk.regions[0].packed);
    }

    #[test]
    fn wrong_cardinality_is_refused() {
        let streams = erp_stream_set();
        let geometry = streams.main_geometry();
        let mut generator = create_packing_generator("column", &streams, 6, 6).unwrap();
        let err = generator
            .generate_merged_tiles_arrange(&selection(&geometry, &[0, 1]))
            .unwrap_err();
        assert_eq!(err.kind(), "plugin_failure");
    }
}
