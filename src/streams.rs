//! # Source Stream Registry
//!
//! Metadata for the encoded inputs the packager plans over: one or more
//! tiled video layers at different bitrates, plus audio. Layers are kept in
//! descending-bitrate order; layer 0 — the "main" high-resolution layer —
//! is authoritative for tile geometry, projection and parameter sets, and
//! every quality ranking is derived from the layer's position in that
//! order.

use std::collections::BTreeMap;

use omaf_geom::tiles::TileGridGeometry;
use omaf_geom::Projection;

use crate::error::{PackerError, PackerResult};

/// One encoded video representation of the source.
#[derive(Clone, Debug)]
pub struct SourceLayer {
    pub width: u32,
    pub height: u32,
    /// Tiles per row across the whole picture.
    pub tile_cols: u8,
    /// Tiles per column across the whole picture.
    pub tile_rows: u8,
    pub bitrate: u64,
    pub gop_size: u32,
    /// Start-coded parameter sets as produced by the encoder.
    pub vps: Vec<u8>,
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

impl SourceLayer {
    pub fn tile_count(&self) -> u32 {
        self.tile_cols as u32 * self.tile_rows as u32
    }

    pub fn tile_width(&self) -> u32 {
        self.width / self.tile_cols as u32
    }

    pub fn tile_height(&self) -> u32 {
        self.height / self.tile_rows as u32
    }
}

/// One encoded audio stream.
#[derive(Clone, Debug)]
pub struct AudioStream {
    pub sampling_rate: u32,
    /// mpegB CICP channel configuration index.
    pub channel_config: u32,
    pub bitrate: u64,
}

/// A media stream keyed into the registry.
#[derive(Clone, Debug)]
pub enum MediaStream {
    Video(SourceLayer),
    Audio(AudioStream),
}

/// The validated, ordered set of input streams.
#[derive(Clone, Debug)]
pub struct StreamSet {
    streams: BTreeMap<u8, MediaStream>,
    /// Video stream ids, descending bitrate; index 0 is the main layer.
    video_order: Vec<u8>,
    projection: Projection,
}

impl StreamSet {
    /// Validate and order the supplied streams.
    ///
    /// `declared_video_count` is the job's own claim and must match the
    /// number of video streams actually present.
    pub fn new(
        streams: BTreeMap<u8, MediaStream>,
        declared_video_count: u8,
        projection: Projection,
    ) -> PackerResult<Self> {
        if streams.is_empty() {
            return Err(PackerError::null_input("media streams"));
        }

        let mut videos: Vec<(u8, u64)> = streams
            .iter()
            .filter_map(|(id, stream)| match stream {
                MediaStream::Video(layer) => Some((*id, layer.bitrate)),
                MediaStream::Audio(_) => None,
            })
            .collect();
        if videos.len() != declared_video_count as usize {
            return Err(PackerError::InvalidVideoCount {
                declared: declared_video_count,
                found: videos.len() as u8,
            });
        }
        if videos.is_empty() {
            return Err(PackerError::null_input("video streams"));
        }
        videos.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let video_order = videos.into_iter().map(|(id, _)| id).collect::<Vec<_>>();

        let set = Self { streams, video_order, projection };
        for layer in set.video_layers() {
            if layer.tile_cols == 0 || layer.tile_rows == 0 {
                return Err(PackerError::null_input("tile grid"));
            }
            if layer.width % layer.tile_cols as u32 != 0
                || layer.height % layer.tile_rows as u32 != 0
            {
                return Err(PackerError::layout(format!(
                    "tile grid {}x{} does not divide the {}x{} picture",
                    layer.tile_cols, layer.tile_rows, layer.width, layer.height
                )));
            }
            if layer.sps.is_empty() || layer.pps.is_empty() {
                return Err(PackerError::null_input("layer parameter sets"));
            }
        }
        Ok(set)
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn get(&self, stream_id: u8) -> PackerResult<&MediaStream> {
        self.streams
            .get(&stream_id)
            .ok_or(PackerError::StreamNotFound { stream_id })
    }

    /// The authoritative high-bitrate layer.
    pub fn main_layer(&self) -> &SourceLayer {
        match &self.streams[&self.video_order[0]] {
            MediaStream::Video(layer) => layer,
            MediaStream::Audio(_) => unreachable!("video_order only holds video ids"),
        }
    }

    /// Video layers in descending-bitrate order.
    pub fn video_layers(&self) -> impl Iterator<Item = &SourceLayer> {
        self.video_order.iter().map(|id| match &self.streams[id] {
            MediaStream::Video(layer) => layer,
            MediaStream::Audio(_) => unreachable!("video_order only holds video ids"),
        })
    }

    pub fn video_count(&self) -> usize {
        self.video_order.len()
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &AudioStream> {
        self.streams.values().filter_map(|stream| match stream {
            MediaStream::Audio(audio) => Some(audio),
            MediaStream::Video(_) => None,
        })
    }

    /// Quality ranking of a layer: 1 for the main layer, increasing with
    /// decreasing bitrate.
    pub fn quality_ranking(&self, layer_index: usize) -> u32 {
        layer_index as u32 + 1
    }

    /// All layer resolutions, main layer first.
    pub fn layer_resolutions(&self) -> Vec<(u32, u32)> {
        self.video_layers()
            .map(|layer| (layer.width, layer.height))
            .collect()
    }

    /// Tile geometry of the main layer.
    pub fn main_geometry(&self) -> TileGridGeometry {
        let main = self.main_layer();
        TileGridGeometry {
            pic_width: main.width,
            pic_height: main.height,
            cols: main.tile_cols,
            rows: main.tile_rows,
            projection: self.projection,
        }
    }

    /// Extractor tracks each segmenter thread should take: the largest of
    /// 4, 3, 2, 1 dividing the main layer's tile count, unless the job
    /// pinned a value.
    pub fn extractor_tracks_per_seg_thread(&self, configured: u8) -> u8 {
        if configured != 0 {
            return configured;
        }
        let tiles = self.main_layer().tile_count();
        [4u8, 3, 2]
            .into_iter()
            .find(|d| tiles % *d as u32 == 0)
            .unwrap_or(1)
    }
}

/// Fixtures shared by the unit tests of the planner modules.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// Two ERP layers (3840×1920 main + 1920×960) and one audio stream,
    /// each with structurally valid synthetic parameter sets.
    pub(crate) fn erp_stream_set() -> StreamSet {
        let mut streams = BTreeMap::new();
        streams.insert(
            0u8,
            MediaStream::Video(SourceLayer {
                width: 3840,
                height: 1920,
                tile_cols: 6,
                tile_rows: 4,
                bitrate: 20_000_000,
                gop_size: 30,
                vps: vec![0, 0, 0, 1, 0x40, 0x01],
                sps: crate::test_param_sets::sps(3840, 1920),
                pps: crate::test_param_sets::pps(),
            }),
        );
        streams.insert(
            1u8,
            MediaStream::Video(SourceLayer {
                width: 1920,
                height: 960,
                tile_cols: 6,
                tile_rows: 4,
                bitrate: 5_000_000,
                gop_size: 30,
                vps: vec![0, 0, 0, 1, 0x40, 0x01],
                sps: crate::test_param_sets::sps(1920, 960),
                pps: crate::test_param_sets::pps(),
            }),
        );
        streams.insert(
            2u8,
            MediaStream::Audio(AudioStream {
                sampling_rate: 48_000,
                channel_config: 2,
                bitrate: 128_000,
            }),
        );
        StreamSet::new(streams, 2, Projection::Erp).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(bitrate: u64, width: u32, height: u32) -> MediaStream {
        MediaStream::Video(SourceLayer {
            width,
            height,
            tile_cols: 6,
            tile_rows: 4,
            bitrate,
            gop_size: 30,
            vps: vec![0, 0, 0, 1, 0x40, 0x01],
            sps: vec![0, 0, 0, 1, 0x42, 0x01],
            pps: vec![0, 0, 0, 1, 0x44, 0x01],
        })
    }

    fn two_layer_set() -> StreamSet {
        let mut streams = BTreeMap::new();
        streams.insert(0u8, layer(5_000_000, 1920, 960));
        streams.insert(1u8, layer(20_000_000, 3840, 1920));
        streams.insert(
            2u8,
            MediaStream::Audio(AudioStream {
                sampling_rate: 48_000,
                channel_config: 2,
                bitrate: 128_000,
            }),
        );
        StreamSet::new(streams, 2, Projection::Erp).unwrap()
    }

    #[test]
    fn layers_order_by_descending_bitrate() {
        let set = two_layer_set();
        assert_eq!(set.main_layer().width, 3840);
        let rates: Vec<u64> = set.video_layers().map(|l| l.bitrate).collect();
        assert_eq!(rates, vec![20_000_000, 5_000_000]);
        assert_eq!(set.layer_resolutions(), vec![(3840, 1920), (1920, 960)]);
    }

    #[test]
    fn declared_count_is_enforced() {
        let mut streams = BTreeMap::new();
        streams.insert(0u8, layer(1, 3840, 1920));
        let err = StreamSet::new(streams, 2, Projection::Erp).unwrap_err();
        assert_eq!(err.kind(), "invalid_video_count");
    }

    #[test]
    fn misaligned_tile_grid_is_rejected() {
        let mut streams = BTreeMap::new();
        streams.insert(0u8, layer(1, 3841, 1920));
        let err = StreamSet::new(streams, 1, Projection::Erp).unwrap_err();
        assert_eq!(err.kind(), "layout_failure");
    }

    #[test]
    fn seg_thread_tuning_prefers_larger_divisors() {
        let set = two_layer_set();
        // 24 tiles divide by 4.
        assert_eq!(set.extractor_tracks_per_seg_thread(0), 4);
        assert_eq!(set.extractor_tracks_per_seg_thread(2), 2);
    }
}
