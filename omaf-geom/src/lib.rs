// SPDX-License-Identifier: MIT
//! # omaf-geom: Sphere and Tile Geometry for Tiled 360° Video
//!
//! This crate provides the pure-math layer of the OMAF packager: tile grid
//! modelling, viewport-driven tile selection on the sphere, aspect
//! regularisation of tile selections, and packed sub-picture layout
//! arithmetic.
//!
//! ## Key Components
//!
//! - [`tiles`]: Tile references, per-layer tile grids, cubemap face mosaic
//! - [`viewport`]: Sphere sampling that resolves a viewport into the set of
//!   tiles it intersects, plus content coverage computation
//! - [`regularise`]: Padding a tile selection until its cardinality
//!   factorises into a near-square grid
//! - [`packing`]: Merged-column arrangement of a selection into a packed
//!   sub-picture, including the merged tile grid used for PPS rewriting
//!
//! ## Design Notes
//!
//! Everything in this crate is synchronous, allocation-light and free of
//! I/O. Selection and layout computation are deterministic: the same inputs
//! always produce the same tile ordering, which downstream track numbering
//! and test suites rely on.

pub mod packing;
pub mod regularise;
pub mod tiles;
pub mod viewport;

pub use tiles::{Projection, Rect, TileDef};
pub use viewport::{CoverageInfo, SphereSampler, ViewportMath, ViewportMathConfig};
