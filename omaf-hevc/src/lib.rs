// SPDX-License-Identifier: MIT
//! # omaf-hevc: HEVC Parameter-Set Rewriting
//!
//! The extractor-track planner stitches tiles from several source bitstreams
//! into one packed picture, so each extractor track needs its own SPS (new
//! picture dimensions) and PPS (new tile grid). This crate re-emits those
//! parameter sets from the main layer's originals at the bitstream level:
//!
//! - [`bits`]: exp-Golomb bit reader/writer and RBSP anti-emulation handling
//! - [`nal`]: NAL unit framing with the 4-byte Annex-B start code
//! - [`sps`]: picture-size rewrite, every other field preserved bit-exact
//! - [`pps`]: tile-grid rewrite (`tiles_enabled_flag` forced on, merged
//!   column/row sizes, loop filter across tiles off)
//!
//! Only the leading fields up to the splice point are parsed; the remainder
//! of each parameter set is copied through untouched, so profile, VUI and
//! extension payloads survive unchanged whatever the encoder put there.

pub mod bits;
pub mod nal;
pub mod pps;
pub mod sps;

pub use nal::{NaluType, START_CODE};
pub use pps::{generate_pps, inspect_pps, PpsSummary, TileGrid};
pub use sps::{generate_sps, inspect_sps, SpsSummary};

use std::fmt;

/// Errors surfaced by parameter-set parsing and rewriting.
#[derive(Debug)]
pub enum ParamSetError {
    /// The SPS could not be parsed up to the splice point.
    InvalidSps(String),
    /// The PPS could not be parsed up to the splice point.
    InvalidPps(String),
    /// The rewritten NAL does not fit the caller's buffer.
    OutputTooSmall { needed: usize, available: usize },
}

impl fmt::Display for ParamSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSetError::InvalidSps(reason) => write!(f, "invalid SPS: {reason}"),
            ParamSetError::InvalidPps(reason) => write!(f, "invalid PPS: {reason}"),
            ParamSetError::OutputTooSmall { needed, available } => write!(
                f,
                "rewritten NAL needs {needed} bytes, caller buffer holds {available}"
            ),
        }
    }
}

impl std::error::Error for ParamSetError {}

/// Result alias for this crate.
pub type ParamSetResult<T> = Result<T, ParamSetError>;
