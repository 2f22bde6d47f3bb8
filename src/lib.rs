//! # OMAF DASH Packager Core
//!
//! Packages tiled 360° video into an OMAF-compliant DASH presentation. For
//! every viewing direction the planner publishes an *extractor track* that
//! stitches tiles drawn from multiple resolution layers into a single
//! decodable picture matching the viewport.
//!
//! ## Architecture
//!
//! The pipeline runs synchronously on the caller's thread:
//!
//! 1. **Sweep** — [`planner::sweep`] walks the sphere on a fixed yaw/pitch
//!    grid and collects every distinct tile selection, padding each to a
//!    near-square cardinality.
//! 2. **Pack** — a [`planner::rwpk::PackingGenerator`] backend (one per
//!    selection size, resolved by name) lays the selection out as a packed
//!    sub-picture and produces the region-wise packing record.
//! 3. **Rewrite** — `omaf-hevc` re-emits the main layer's SPS/PPS for the
//!    packed picture size and merged tile grid.
//! 4. **Assemble** — [`planner::ExtractorTrackPlanner`] binds selection,
//!    packing, coverage and parameter sets into [`planner::track::ExtractorTrack`]s.
//! 5. **Emit** — [`mpd::MpdWriter`] serialises everything as a static or
//!    live MPD, optionally with the CMAF low-latency surface.
//!
//! Pure geometry lives in `omaf-geom`, bitstream plumbing in `omaf-hevc`;
//! this crate orchestrates them over the stream metadata in [`streams`].
//!
//! ## Example
//!
//! ```no_run
//! use omaf_dash_packer::{build_presentation, PackerConfig};
//! use omaf_dash_packer::streams::StreamSet;
//! # fn load_streams() -> StreamSet { unimplemented!() }
//!
//! let config = PackerConfig::from_json_file("job.json")?;
//! let streams = load_streams();
//! let summary = build_presentation(&config, &streams, 108_000)?;
//! println!("{} extractor tracks -> {:?}", summary.extractor_tracks, summary.mpd_path);
//! # Ok::<(), omaf_dash_packer::PackerError>(())
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::info;

pub mod config;
pub mod error;
pub mod mpd;
pub mod planner;
pub mod streams;

pub use config::{FrameRate, PackerConfig, Projection, SegmentationConfig, ViewportConfig};
pub use error::{PackerError, PackerResult};
pub use planner::ExtractorTrackPlanner;

use mpd::MpdWriter;
use planner::track::ExtractorTrack;
use streams::StreamSet;

/// What a packaging run produced.
#[derive(Clone, Debug)]
pub struct PlanSummary {
    /// Distinct viewports the sweep kept.
    pub viewport_count: u16,
    /// Extractor tracks emitted into the MPD.
    pub extractor_tracks: usize,
    /// Distinct selection cardinalities, ascending.
    pub selection_sizes: Vec<u16>,
    /// Where the MPD landed.
    pub mpd_path: PathBuf,
    /// Segmenter tuning derived from the tile grid.
    pub extractor_tracks_per_seg_thread: u8,
}

/// Run the full pipeline: plan extractor tracks and write the MPD.
///
/// Planar content carries no viewport sweep; its presentation holds only
/// the base, tile and audio adaptation sets.
pub fn build_presentation(
    config: &PackerConfig,
    streams: &StreamSet,
    total_frames: u64,
) -> PackerResult<PlanSummary> {
    config.validate()?;

    let (tracks, viewport_count, selection_sizes) =
        if streams.projection() == Projection::Planar {
            (BTreeMap::new(), 0, Vec::new())
        } else {
            let mut planner = ExtractorTrackPlanner::initialize(streams, config)?;
            let sizes: Vec<u16> = planner.outcome().selections.keys().copied().collect();
            let viewports = planner.viewport_count();
            let tracks: BTreeMap<u16, ExtractorTrack> = planner.generate_extractor_tracks()?;
            (tracks, viewports, sizes)
        };

    let mut writer = MpdWriter::new(streams, &tracks, config)?;
    writer.write_mpd(total_frames)?;

    let summary = PlanSummary {
        viewport_count,
        extractor_tracks: tracks.len(),
        selection_sizes,
        mpd_path: writer.mpd_path().to_path_buf(),
        extractor_tracks_per_seg_thread: streams.extractor_tracks_per_seg_thread(
            config.segmentation.extractor_tracks_per_seg_thread,
        ),
    };
    info!(
        "presentation built: {} viewports, {} extractor tracks",
        summary.viewport_count, summary.extractor_tracks
    );
    Ok(summary)
}

/// Synthetic but structurally valid parameter sets for unit tests.
#[cfg(test)]
pub(crate) mod test_param_sets {
    use omaf_hevc::bits::{insert_emulation_prevention, BitWriter};
    use omaf_hevc::nal::{emit_nalu, NaluType};

    fn frame(nalu: NaluType, writer: BitWriter) -> Vec<u8> {
        let ebsp = insert_emulation_prevention(&writer.into_bytes());
        let mut out = vec![0u8; ebsp.len() + 6];
        let len = emit_nalu(nalu, &ebsp, &mut out).unwrap();
        out.truncate(len);
        out
    }

    /// Main-profile SPS advertising the given picture size.
    pub(crate) fn sps(width: u32, height: u32) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0, 4); // sps_video_parameter_set_id
        w.write_bits(0, 3); // sps_max_sub_layers_minus1
        w.write_flag(true); // sps_temporal_id_nesting_flag
        w.write_bits(0, 2); // general_profile_space
        w.write_flag(false); // general_tier_flag
        w.write_bits(1, 5); // general_profile_idc
        w.write_bits(0x6000_0000, 32); // compatibility flags
        w.write_bits(0xB000_0000, 32); // source/constraint flags
        w.write_bits(0, 16);
        w.write_bits(153, 8); // general_level_idc
        w.write_ue(0); // sps_seq_parameter_set_id
        w.write_ue(1); // chroma_format_idc
        w.write_ue(width);
        w.write_ue(height);
        w.write_flag(false); // conformance_window_flag
        w.write_ue(0); // bit_depth_luma_minus8
        w.write_ue(0); // bit_depth_chroma_minus8
        w.write_ue(4); // log2_max_pic_order_cnt_lsb_minus4
        w.write_flag(false); // sps_sub_layer_ordering_info_present_flag
        w.write_ue(3); // sps_max_dec_pic_buffering_minus1
        w.write_ue(0); // sps_max_num_reorder_pics
        w.write_ue(0); // sps_max_latency_increase_plus1
        w.write_ue(0); // log2_min_luma_coding_block_size_minus3
        w.write_ue(3); // log2_diff_max_min_luma_coding_block_size
        w.write_ue(0); // log2_min_luma_transform_block_size_minus2
        w.write_ue(3); // log2_diff_max_min_luma_transform_block_size
        w.write_ue(0); // max_transform_hierarchy_depth_inter
        w.write_ue(0); // max_transform_hierarchy_depth_intra
        w.write_flag(false); // scaling_list_enabled_flag
        w.write_flag(false); // amp_enabled_flag
        w.write_flag(true); // sample_adaptive_offset_enabled_flag
        w.write_flag(false); // pcm_enabled_flag
        w.write_ue(0); // num_short_term_ref_pic_sets
        w.write_flag(false); // long_term_ref_pics_present_flag
        w.write_flag(true); // sps_temporal_mvp_enabled_flag
        w.write_flag(true); // strong_intra_smoothing_enabled_flag
        w.write_flag(false); // vui_parameters_present_flag
        w.write_flag(false); // sps_extension_present_flag
        w.write_trailing_bits();
        frame(NaluType::Sps, w)
    }

    /// Untiled PPS; the rewriter adds the tile section.
    pub(crate) fn pps() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_ue(0); // pps_pic_parameter_set_id
        w.write_ue(0); // pps_seq_parameter_set_id
        w.write_flag(false); // dependent_slice_segments_enabled_flag
        w.write_flag(false); // output_flag_present_flag
        w.write_bits(0, 3); // num_extra_slice_header_bits
        w.write_flag(false); // sign_data_hiding_enabled_flag
        w.write_flag(false); // cabac_init_present_flag
        w.write_ue(0); // num_ref_idx_l0_default_active_minus1
        w.write_ue(0); // num_ref_idx_l1_default_active_minus1
        w.write_se(0); // init_qp_minus26
        w.write_flag(false); // constrained_intra_pred_flag
        w.write_flag(false); // transform_skip_enabled_flag
        w.write_flag(false); // cu_qp_delta_enabled_flag
        w.write_se(0); // pps_cb_qp_offset
        w.write_se(0); // pps_cr_qp_offset
        w.write_flag(false); // pps_slice_chroma_qp_offsets_present_flag
        w.write_flag(false); // weighted_pred_flag
        w.write_flag(false); // weighted_bipred_flag
        w.write_flag(false); // transquant_bypass_enabled_flag
        w.write_flag(false); // tiles_enabled_flag
        w.write_flag(false); // entropy_coding_sync_enabled_flag
        w.write_flag(true); // pps_loop_filter_across_slices_enabled_flag
        w.write_flag(false); // deblocking_filter_control_present_flag
        w.write_flag(false); // pps_scaling_list_data_present_flag
        w.write_flag(false); // lists_modification_present_flag
        w.write_ue(0); // log2_parallel_merge_level_minus2
        w.write_flag(false); // slice_segment_header_extension_present_flag
        w.write_flag(false); // pps_extension_present_flag
        w.write_trailing_bits();
        frame(NaluType::Pps, w)
    }
}
