//! Shared fixtures for the packager integration tests: synthetic parameter
//! sets, stream sets for the projection layouts under test, and a scripted
//! viewport-math backend for tests that need exact selection control.

use std::collections::BTreeMap;

use anyhow::Result;
use omaf_dash_packer::streams::{AudioStream, MediaStream, SourceLayer, StreamSet};
use omaf_dash_packer::{PackerConfig, Projection};
use omaf_geom::tiles::TileDef;
use omaf_geom::viewport::{CoverageInfo, ViewportMath};
use omaf_hevc::bits::{insert_emulation_prevention, BitWriter};
use omaf_hevc::nal::{emit_nalu, NaluType};

fn frame(nalu: NaluType, writer: BitWriter) -> Vec<u8> {
    let ebsp = insert_emulation_prevention(&writer.into_bytes());
    let mut out = vec![0u8; ebsp.len() + 6];
    let len = emit_nalu(nalu, &ebsp, &mut out).unwrap();
    out.truncate(len);
    out
}

/// Structurally valid Main-profile SPS for the given picture size.
pub fn sps(width: u32, height: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 4);
    w.write_bits(0, 3);
    w.write_flag(true);
    w.write_bits(0, 2);
    w.write_flag(false);
    w.write_bits(1, 5);
    w.write_bits(0x6000_0000, 32);
    w.write_bits(0xB000_0000, 32);
    w.write_bits(0, 16);
    w.write_bits(153, 8);
    w.write_ue(0);
    w.write_ue(1);
    w.write_ue(width);
    w.write_ue(height);
    w.write_flag(false);
    w.write_ue(0);
    w.write_ue(0);
    w.write_ue(4);
    w.write_flag(false);
    w.write_ue(3);
    w.write_ue(0);
    w.write_ue(0);
    w.write_ue(0);
    w.write_ue(3);
    w.write_ue(0);
    w.write_ue(3);
    w.write_ue(0);
    w.write_ue(0);
    w.write_flag(false);
    w.write_flag(false);
    w.write_flag(true);
    w.write_flag(false);
    w.write_ue(0);
    w.write_flag(false);
    w.write_flag(true);
    w.write_flag(true);
    w.write_flag(false);
    w.write_flag(false);
    w.write_trailing_bits();
    frame(NaluType::Sps, w)
}

/// Untiled PPS for the rewriter to add a tile section to.
pub fn pps() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_ue(0);
    w.write_ue(0);
    w.write_flag(false);
    w.write_flag(false);
    w.write_bits(0, 3);
    w.write_flag(false);
    w.write_flag(false);
    w.write_ue(0);
    w.write_ue(0);
    w.write_se(0);
    w.write_flag(false);
    w.write_flag(false);
    w.write_flag(false);
    w.write_se(0);
    w.write_se(0);
    w.write_flag(false);
    w.write_flag(false);
    w.write_flag(false);
    w.write_flag(false);
    w.write_flag(false);
    w.write_flag(false);
    w.write_flag(true);
    w.write_flag(false);
    w.write_flag(false);
    w.write_flag(false);
    w.write_ue(0);
    w.write_flag(false);
    w.write_flag(false);
    w.write_trailing_bits();
    frame(NaluType::Pps, w)
}

fn vps() -> Vec<u8> {
    vec![0, 0, 0, 1, 0x40, 0x01, 0x0C]
}

pub fn video_layer(width: u32, height: u32, bitrate: u64) -> MediaStream {
    MediaStream::Video(SourceLayer {
        width,
        height,
        tile_cols: 6,
        tile_rows: 4,
        bitrate,
        gop_size: 30,
        vps: vps(),
        sps: sps(width, height),
        pps: pps(),
    })
}

pub fn audio_stream() -> MediaStream {
    MediaStream::Audio(AudioStream {
        sampling_rate: 48_000,
        channel_config: 2,
        bitrate: 128_000,
    })
}

/// Two ERP layers (3840×1920 main, 1920×960 low) plus audio.
pub fn erp_streams() -> StreamSet {
    let mut streams = BTreeMap::new();
    streams.insert(0u8, video_layer(1920, 960, 5_000_000));
    streams.insert(1u8, video_layer(3840, 1920, 20_000_000));
    streams.insert(2u8, audio_stream());
    StreamSet::new(streams, 2, Projection::Erp).unwrap()
}

/// Single cubemap layer, 3072×2048 as a 3×2 face mosaic with 2×2 tiles per
/// face.
pub fn cubemap_streams() -> StreamSet {
    let mut streams = BTreeMap::new();
    streams.insert(0u8, video_layer(3072, 2048, 20_000_000));
    StreamSet::new(streams, 1, Projection::Cubemap).unwrap()
}

/// Single planar layer plus audio.
pub fn planar_streams() -> StreamSet {
    let mut streams = BTreeMap::new();
    streams.insert(0u8, video_layer(3840, 1920, 20_000_000));
    streams.insert(1u8, video_layer(1920, 960, 5_000_000));
    streams.insert(2u8, audio_stream());
    StreamSet::new(streams, 2, Projection::Planar).unwrap()
}

pub fn erp_config() -> PackerConfig {
    let mut config = PackerConfig::default();
    config.proj_type = Projection::Erp;
    config.viewport.fov_h = 90.0;
    config.viewport.fov_v = 90.0;
    config
}

pub fn cubemap_config() -> PackerConfig {
    let mut config = PackerConfig::default();
    config.proj_type = Projection::Cubemap;
    config.viewport.fov_h = 100.0;
    config.viewport.fov_v = 100.0;
    config
}

/// Viewport-math backend that replays a fixed script of selections, for
/// tests that need exact control over what each viewport returns.
pub struct ScriptedMath {
    script: Vec<Vec<TileDef>>,
    cursor: usize,
    current: Vec<TileDef>,
}

impl ScriptedMath {
    pub fn new(script: Vec<Vec<TileDef>>) -> Self {
        Self { script, cursor: 0, current: Vec::new() }
    }
}

impl ViewportMath for ScriptedMath {
    fn set_viewport(&mut self, _yaw: f32, _pitch: f32) -> Result<()> {
        Ok(())
    }

    fn process(&mut self) -> Result<()> {
        self.current = self.script[self.cursor % self.script.len()].clone();
        self.cursor += 1;
        Ok(())
    }

    fn tiles_in_viewport(&self) -> Result<&[TileDef]> {
        Ok(&self.current)
    }

    fn content_coverage(&self) -> Result<CoverageInfo> {
        Ok(CoverageInfo {
            centre_azimuth: 0,
            centre_elevation: 0,
            azimuth_range: 90 << 16,
            elevation_range: 90 << 16,
        })
    }
}

/// Main-layer tiles (3840×1920, 6×4) by row-major index.
pub fn erp_tiles(ids: &[u16]) -> Vec<TileDef> {
    ids.iter()
        .map(|&idx| TileDef {
            face_id: 0,
            idx,
            x: (idx as u32 % 6) * 640,
            y: (idx as u32 / 6) * 480,
        })
        .collect()
}
