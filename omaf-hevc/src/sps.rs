// SPDX-License-Identifier: MIT
//! # SPS Rewrite
//!
//! The packed picture of an extractor track rarely matches the source
//! picture size, so the SPS is re-emitted with new
//! `pic_width_in_luma_samples` / `pic_height_in_luma_samples`. Everything
//! before the size fields is copied bit-exact, everything after (conformance
//! window, bit depths, VUI, extensions) is spliced through untouched.

use crate::bits::{
    copy_tail, insert_emulation_prevention, strip_emulation_prevention, BitReader, BitWriter,
};
use crate::nal::{emit_nalu, split_nalu, NaluType};
use crate::{ParamSetError, ParamSetResult};

/// Smallest luma coding block size the standard permits; rewritten picture
/// dimensions are rounded up to it.
const MIN_CU_SIZE: u32 = 8;

/// Fields of interest parsed back out of an SPS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpsSummary {
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub width: u32,
    pub height: u32,
    pub conformance_window: bool,
}

struct SplicePoints {
    before_width: usize,
    after_height: usize,
    sps_id: u32,
    chroma_format_idc: u32,
    width: u32,
    height: u32,
}

/// profile_tier_level with profilePresentFlag = 1.
fn skip_profile_tier_level(r: &mut BitReader<'_>, max_sub_layers_minus1: u32) -> ParamSetResult<()> {
    // general_profile_space .. general_reserved bits, then level_idc.
    r.read_bits(8)?;
    r.read_bits(32)?; // profile compatibility flags
    r.read_bits(32)?;
    r.read_bits(16)?; // source/constraint/reserved bits (48 total)
    r.read_bits(8)?; // general_level_idc

    let mut profile_present = [false; 8];
    let mut level_present = [false; 8];
    for i in 0..max_sub_layers_minus1 as usize {
        profile_present[i] = r.read_flag()?;
        level_present[i] = r.read_flag()?;
    }
    if max_sub_layers_minus1 > 0 {
        for _ in max_sub_layers_minus1..8 {
            r.read_bits(2)?;
        }
    }
    for i in 0..max_sub_layers_minus1 as usize {
        if profile_present[i] {
            r.read_bits(32)?;
            r.read_bits(32)?;
            r.read_bits(24)?; // 88 bits of sub-layer profile
        }
        if level_present[i] {
            r.read_bits(8)?;
        }
    }
    Ok(())
}

fn locate_splice(rbsp: &[u8]) -> ParamSetResult<SplicePoints> {
    let mut r = BitReader::new(rbsp);
    r.read_bits(4)?; // sps_video_parameter_set_id
    let max_sub_layers_minus1 = r.read_bits(3)?;
    if max_sub_layers_minus1 > 6 {
        return Err(ParamSetError::InvalidSps(format!(
            "sps_max_sub_layers_minus1 {max_sub_layers_minus1} out of range"
        )));
    }
    r.read_flag()?; // sps_temporal_id_nesting_flag
    skip_profile_tier_level(&mut r, max_sub_layers_minus1)?;
    let sps_id = r.read_ue()?;
    let chroma_format_idc = r.read_ue()?;
    if chroma_format_idc > 3 {
        return Err(ParamSetError::InvalidSps(format!(
            "chroma_format_idc {chroma_format_idc} out of range"
        )));
    }
    if chroma_format_idc == 3 {
        r.read_flag()?; // separate_colour_plane_flag
    }
    let before_width = r.bit_pos();
    let width = r.read_ue()?;
    let height = r.read_ue()?;
    if width == 0 || height == 0 {
        return Err(ParamSetError::InvalidSps("zero picture dimension".into()));
    }
    Ok(SplicePoints {
        before_width,
        after_height: r.bit_pos(),
        sps_id,
        chroma_format_idc,
        width,
        height,
    })
}

/// Re-emit `orig_sps` (start-coded) with the packed picture dimensions.
///
/// Writes the start-coded result into `out` and returns the byte length.
/// `out` is the caller-owned parameter-set buffer; 1024 bytes always fit.
pub fn generate_sps(
    orig_sps: &[u8],
    packed_width: u32,
    packed_height: u32,
    out: &mut [u8],
) -> ParamSetResult<usize> {
    if packed_width == 0 || packed_height == 0 {
        return Err(ParamSetError::InvalidSps(
            "packed picture dimensions must be non-zero".into(),
        ));
    }
    let (nalu, ebsp) = split_nalu(orig_sps)?;
    if nalu != NaluType::Sps {
        return Err(ParamSetError::InvalidSps(format!(
            "expected SPS NAL, found {nalu:?}"
        )));
    }
    let rbsp = strip_emulation_prevention(ebsp);
    let splice = locate_splice(&rbsp)?;

    let width = packed_width.div_ceil(MIN_CU_SIZE) * MIN_CU_SIZE;
    let height = packed_height.div_ceil(MIN_CU_SIZE) * MIN_CU_SIZE;
    log::debug!(
        "rewriting SPS {}x{} -> {width}x{height}",
        splice.width,
        splice.height
    );

    let mut w = BitWriter::new();
    let mut r = BitReader::new(&rbsp);
    while r.bit_pos() < splice.before_width {
        let bit = r.read_bit()?;
        w.write_bit(bit);
    }
    w.write_ue(width);
    w.write_ue(height);

    let mut tail = BitReader::new(&rbsp);
    while tail.bit_pos() < splice.after_height {
        tail.read_bit()?;
    }
    copy_tail(&mut tail, &mut w)?;

    let ebsp_out = insert_emulation_prevention(&w.into_bytes());
    emit_nalu(NaluType::Sps, &ebsp_out, out)
}

/// Parse the leading fields of a start-coded SPS.
pub fn inspect_sps(sps: &[u8]) -> ParamSetResult<SpsSummary> {
    let (nalu, ebsp) = split_nalu(sps)?;
    if nalu != NaluType::Sps {
        return Err(ParamSetError::InvalidSps(format!(
            "expected SPS NAL, found {nalu:?}"
        )));
    }
    let rbsp = strip_emulation_prevention(ebsp);
    let splice = locate_splice(&rbsp)?;

    let mut r = BitReader::new(&rbsp);
    while r.bit_pos() < splice.after_height {
        r.read_bit()?;
    }
    let conformance_window = r.read_flag()?;

    Ok(SpsSummary {
        sps_id: splice.sps_id,
        chroma_format_idc: splice.chroma_format_idc,
        width: splice.width,
        height: splice.height,
        conformance_window,
    })
}
