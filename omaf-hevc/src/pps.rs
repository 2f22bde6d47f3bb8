// SPDX-License-Identifier: MIT
//! # PPS Rewrite
//!
//! The stitched picture of an extractor track is an HEVC tile mosaic, so
//! its PPS must advertise the merged grid: `tiles_enabled_flag` on, the
//! merged column/row counts, explicit sizes when the grid is non-uniform,
//! and the loop filter disabled across tile boundaries so tiles drawn from
//! different source bitstreams never filter into each other.
//!
//! As with the SPS, only the prefix up to the tile syntax is parsed; the
//! original tile section (if any) is dropped, the new one written, and the
//! remaining fields are spliced through bit-exact.

use crate::bits::{
    copy_tail, insert_emulation_prevention, strip_emulation_prevention, BitReader, BitWriter,
};
use crate::nal::{emit_nalu, split_nalu, NaluType};
use crate::{ParamSetError, ParamSetResult};

/// CTB size assumed when converting merged-grid luma sizes to the CTB units
/// the PPS tile syntax uses.
pub const CTB_SIZE: u32 = 64;

/// Luma size to whole CTBs, never less than one.
fn luma_to_ctb(luma: u32) -> u32 {
    (luma / CTB_SIZE).max(1)
}

/// Merged tile grid of the packed picture, in luma samples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileGrid {
    pub col_widths: Vec<u32>,
    pub row_heights: Vec<u32>,
}

impl TileGrid {
    fn validate(&self) -> ParamSetResult<()> {
        if self.col_widths.is_empty() || self.row_heights.is_empty() {
            return Err(ParamSetError::InvalidPps("empty merged tile grid".into()));
        }
        Ok(())
    }

    /// Uniform spacing is only expressible in CTB units, so it additionally
    /// requires every size to be a whole number of CTBs.
    fn is_uniform(&self) -> bool {
        let even = |sizes: &[u32]| {
            sizes.windows(2).all(|s| s[0] == s[1]) && sizes.iter().all(|s| s % CTB_SIZE == 0)
        };
        even(&self.col_widths) && even(&self.row_heights)
    }
}

/// Fields of interest parsed back out of a PPS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PpsSummary {
    pub pps_id: u32,
    pub sps_id: u32,
    pub tiles_enabled: bool,
    pub num_tile_columns: u32,
    pub num_tile_rows: u32,
    pub uniform_spacing: bool,
    /// Explicit column widths in CTBs (last column implied, absent when
    /// uniform).
    pub column_widths_ctb: Vec<u32>,
    pub row_heights_ctb: Vec<u32>,
    pub loop_filter_across_tiles: bool,
}

fn as_pps_err(err: ParamSetError) -> ParamSetError {
    match err {
        ParamSetError::InvalidSps(reason) => ParamSetError::InvalidPps(reason),
        other => other,
    }
}

struct PpsPrefix {
    /// Bit position of tiles_enabled_flag.
    before_tiles_flag: usize,
    /// Bit position just past the original tile section (at
    /// pps_loop_filter_across_slices_enabled_flag).
    after_tiles_section: usize,
    entropy_coding_sync: bool,
    pps_id: u32,
    sps_id: u32,
    tiles: Option<TilesSection>,
}

struct TilesSection {
    num_tile_columns: u32,
    num_tile_rows: u32,
    uniform_spacing: bool,
    column_widths_ctb: Vec<u32>,
    row_heights_ctb: Vec<u32>,
    loop_filter_across_tiles: bool,
}

fn parse_prefix(rbsp: &[u8]) -> ParamSetResult<PpsPrefix> {
    let mut r = BitReader::new(rbsp);
    let mut step = || -> ParamSetResult<PpsPrefix> {
        let pps_id = r.read_ue()?;
        let sps_id = r.read_ue()?;
        r.read_flag()?; // dependent_slice_segments_enabled_flag
        r.read_flag()?; // output_flag_present_flag
        r.read_bits(3)?; // num_extra_slice_header_bits
        r.read_flag()?; // sign_data_hiding_enabled_flag
        r.read_flag()?; // cabac_init_present_flag
        r.read_ue()?; // num_ref_idx_l0_default_active_minus1
        r.read_ue()?; // num_ref_idx_l1_default_active_minus1
        r.read_se()?; // init_qp_minus26
        r.read_flag()?; // constrained_intra_pred_flag
        r.read_flag()?; // transform_skip_enabled_flag
        if r.read_flag()? {
            r.read_ue()?; // diff_cu_qp_delta_depth
        }
        r.read_se()?; // pps_cb_qp_offset
        r.read_se()?; // pps_cr_qp_offset
        r.read_flag()?; // pps_slice_chroma_qp_offsets_present_flag
        r.read_flag()?; // weighted_pred_flag
        r.read_flag()?; // weighted_bipred_flag
        r.read_flag()?; // transquant_bypass_enabled_flag

        let before_tiles_flag = r.bit_pos();
        let tiles_enabled = r.read_flag()?;
        let entropy_coding_sync = r.read_flag()?;

        let tiles = if tiles_enabled {
            let num_tile_columns = r.read_ue()? + 1;
            let num_tile_rows = r.read_ue()? + 1;
            if num_tile_columns > 256 || num_tile_rows > 256 {
                return Err(ParamSetError::InvalidPps(format!(
                    "implausible tile grid {num_tile_columns}x{num_tile_rows}"
                )));
            }
            let uniform_spacing = r.read_flag()?;
            let mut column_widths_ctb = Vec::new();
            let mut row_heights_ctb = Vec::new();
            if !uniform_spacing {
                for _ in 0..num_tile_columns - 1 {
                    column_widths_ctb.push(r.read_ue()? + 1);
                }
                for _ in 0..num_tile_rows - 1 {
                    row_heights_ctb.push(r.read_ue()? + 1);
                }
            }
            let loop_filter_across_tiles = r.read_flag()?;
            Some(TilesSection {
                num_tile_columns,
                num_tile_rows,
                uniform_spacing,
                column_widths_ctb,
                row_heights_ctb,
                loop_filter_across_tiles,
            })
        } else {
            None
        };

        Ok(PpsPrefix {
            before_tiles_flag,
            after_tiles_section: r.bit_pos(),
            entropy_coding_sync,
            pps_id,
            sps_id,
            tiles,
        })
    };
    step().map_err(as_pps_err)
}

/// Re-emit `orig_pps` (start-coded) advertising the merged tile grid.
///
/// Writes the start-coded result into `out` and returns the byte length.
pub fn generate_pps(orig_pps: &[u8], grid: &TileGrid, out: &mut [u8]) -> ParamSetResult<usize> {
    grid.validate()?;
    let (nalu, ebsp) = split_nalu(orig_pps).map_err(as_pps_err)?;
    if nalu != NaluType::Pps {
        return Err(ParamSetError::InvalidPps(format!(
            "expected PPS NAL, found {nalu:?}"
        )));
    }
    let rbsp = strip_emulation_prevention(ebsp);
    let prefix = parse_prefix(&rbsp)?;
    log::debug!(
        "rewriting PPS tile grid to {}x{}",
        grid.col_widths.len(),
        grid.row_heights.len()
    );

    let mut w = BitWriter::new();
    let mut r = BitReader::new(&rbsp);
    while r.bit_pos() < prefix.before_tiles_flag {
        let bit = r.read_bit().map_err(as_pps_err)?;
        w.write_bit(bit);
    }

    w.write_flag(true); // tiles_enabled_flag
    w.write_flag(prefix.entropy_coding_sync);
    w.write_ue(grid.col_widths.len() as u32 - 1);
    w.write_ue(grid.row_heights.len() as u32 - 1);
    let uniform = grid.is_uniform();
    w.write_flag(uniform);
    if !uniform {
        // Last column/row sizes are implied by the picture dimensions.
        for width in &grid.col_widths[..grid.col_widths.len() - 1] {
            w.write_ue(luma_to_ctb(*width) - 1);
        }
        for height in &grid.row_heights[..grid.row_heights.len() - 1] {
            w.write_ue(luma_to_ctb(*height) - 1);
        }
    }
    w.write_flag(false); // loop_filter_across_tiles_enabled_flag

    let mut tail = BitReader::new(&rbsp);
    while tail.bit_pos() < prefix.after_tiles_section {
        tail.read_bit().map_err(as_pps_err)?;
    }
    copy_tail(&mut tail, &mut w).map_err(as_pps_err)?;

    let ebsp_out = insert_emulation_prevention(&w.into_bytes());
    emit_nalu(NaluType::Pps, &ebsp_out, out)
}

/// Parse the leading fields of a start-coded PPS.
pub fn inspect_pps(pps: &[u8]) -> ParamSetResult<PpsSummary> {
    let (nalu, ebsp) = split_nalu(pps).map_err(as_pps_err)?;
    if nalu != NaluType::Pps {
        return Err(ParamSetError::InvalidPps(format!(
            "expected PPS NAL, found {nalu:?}"
        )));
    }
    let rbsp = strip_emulation_prevention(ebsp);
    let prefix = parse_prefix(&rbsp)?;

    Ok(match prefix.tiles {
        Some(tiles) => PpsSummary {
            pps_id: prefix.pps_id,
            sps_id: prefix.sps_id,
            tiles_enabled: true,
            num_tile_columns: tiles.num_tile_columns,
            num_tile_rows: tiles.num_tile_rows,
            uniform_spacing: tiles.uniform_spacing,
            column_widths_ctb: tiles.column_widths_ctb,
            row_heights_ctb: tiles.row_heights_ctb,
            loop_filter_across_tiles: tiles.loop_filter_across_tiles,
        },
        None => PpsSummary {
            pps_id: prefix.pps_id,
            sps_id: prefix.sps_id,
            tiles_enabled: false,
            num_tile_columns: 1,
            num_tile_rows: 1,
            uniform_spacing: true,
            column_widths_ctb: Vec::new(),
            row_heights_ctb: Vec::new(),
            loop_filter_across_tiles: true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    /// Minimal valid PPS; `tiled` controls whether the source already
    /// carries a tile section.
    pub(crate) fn build_pps(tiled: Option<(u32, u32)>) -> Vec<u8> {
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
        match tiled {
            Some((cols, rows)) => {
                w.write_flag(true); // tiles_enabled_flag
                w.write_flag(false); // entropy_coding_sync_enabled_flag
                w.write_ue(cols - 1);
                w.write_ue(rows - 1);
                w.write_flag(true); // uniform_spacing_flag
                w.write_flag(true); // loop_filter_across_tiles_enabled_flag
            }
            None => {
                w.write_flag(false); // tiles_enabled_flag
                w.write_flag(false); // entropy_coding_sync_enabled_flag
            }
        }
        w.write_flag(true); // pps_loop_filter_across_slices_enabled_flag
        w.write_flag(false); // deblocking_filter_control_present_flag
        w.write_flag(false); // pps_scaling_list_data_present_flag
        w.write_flag(false); // lists_modification_present_flag
        w.write_ue(0); // log2_parallel_merge_level_minus2
        w.write_flag(false); // slice_segment_header_extension_present_flag
        w.write_flag(false); // pps_extension_present_flag
        w.write_trailing_bits();

        let ebsp = insert_emulation_prevention(&w.into_bytes());
        let mut out = vec![0u8; ebsp.len() + 6];
        let len = emit_nalu(NaluType::Pps, &ebsp, &mut out).unwrap();
        out.truncate(len);
        out
    }

    fn grid(cols: &[u32], rows: &[u32]) -> TileGrid {
        TileGrid {
            col_widths: cols.to_vec(),
            row_heights: rows.to_vec(),
        }
    }

    #[test]
    fn untiled_pps_gains_a_uniform_grid() {
        let orig = build_pps(None);
        let mut buf = [0u8; 1024];
        let len = generate_pps(&orig, &grid(&[640, 640], &[448, 448, 448]), &mut buf).unwrap();

        let summary = inspect_pps(&buf[..len]).unwrap();
        assert!(summary.tiles_enabled);
        assert_eq!(summary.num_tile_columns, 2);
        assert_eq!(summary.num_tile_rows, 3);
        assert!(summary.uniform_spacing);
        assert!(!summary.loop_filter_across_tiles);
    }

    #[test]
    fn existing_tile_section_is_replaced() {
        let orig = build_pps(Some((6, 4)));
        let mut buf = [0u8; 1024];
        let len = generate_pps(&orig, &grid(&[640, 640, 704], &[512, 512]), &mut buf).unwrap();

        let summary = inspect_pps(&buf[..len]).unwrap();
        assert_eq!(summary.num_tile_columns, 3);
        assert_eq!(summary.num_tile_rows, 2);
        assert!(!summary.uniform_spacing);
        assert_eq!(summary.column_widths_ctb, vec![10, 10]);
        assert_eq!(summary.row_heights_ctb, vec![8]);
    }

    #[test]
    fn non_ctb_sizes_force_explicit_spacing() {
        let orig = build_pps(None);
        let mut buf = [0u8; 1024];
        // 480 is not a whole CTB; uniform spacing cannot express it.
        let len = generate_pps(&orig, &grid(&[640, 640], &[480, 480, 512]), &mut buf).unwrap();
        let summary = inspect_pps(&buf[..len]).unwrap();
        assert!(!summary.uniform_spacing);
        assert_eq!(summary.row_heights_ctb, vec![7, 7]);
    }

    #[test]
    fn empty_grid_is_rejected() {
        let orig = build_pps(None);
        let mut buf = [0u8; 1024];
        let err = generate_pps(&orig, &grid(&[], &[]), &mut buf).unwrap_err();
        assert!(matches!(err, ParamSetError::InvalidPps(_)));
    }
}
