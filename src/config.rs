//! # Packager Configuration
//!
//! Configuration structures shared by the CLI and the library surface. The
//! packager is driven by a JSON job description; the structures here carry
//! serde derives for that file, sensible defaults for everything optional,
//! and a `validate()` pass that turns inconsistent jobs into structured
//! errors before any planning work starts.
//!
//! ## Parameters
//!
//! | Group | Field | Meaning |
//! |-------|-------|---------|
//! | top   | `proj_type` | ERP, CUBEMAP or PLANAR source projection |
//! | top   | `frame_rate` | source frame rate as num/den |
//! | top   | `fixed_packed_pic_res` | one packed resolution for all tracks |
//! | top   | `cmaf_enabled` | chunked low-latency segments |
//! | top   | `packing_plugin` | packing-generator backend name |
//! | viewport | `width`/`height`, `yaw`/`pitch`, `fov_h`/`fov_v` | viewing setup the sweep plans for |
//! | segmentation | see [`SegmentationConfig`] | DASH output shape |

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use omaf_geom::Projection;

use crate::error::{PackerError, PackerResult};

/// Source frame rate as a rational number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u64,
    pub den: u64,
}

impl FrameRate {
    /// Frame rate × 1000, rounded; the key into the timescale correction
    /// table (29.97 → 29970 and friends).
    pub fn millis(&self) -> u64 {
        ((self.num as f64 / self.den as f64) * 1000.0 + 0.5) as u64
    }

    /// Frames per second rounded to the nearest integer.
    pub fn rounded(&self) -> u64 {
        (self.num as f64 / self.den as f64 + 0.5) as u64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

/// Viewing setup the sweep plans extractor tracks for.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Target display width in luma samples.
    pub width: u32,
    /// Target display height in luma samples.
    pub height: u32,
    /// Initial viewing yaw in degrees, −180..=180.
    pub yaw: f32,
    /// Initial viewing pitch in degrees, −90..=90.
    pub pitch: f32,
    /// Horizontal field of view in degrees.
    pub fov_h: f32,
    /// Vertical field of view in degrees.
    pub fov_v: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            yaw: 0.0,
            pitch: 0.0,
            fov_h: 80.0,
            fov_v: 80.0,
        }
    }
}

/// DASH segmentation and MPD output options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Segment duration in seconds.
    pub seg_duration: u64,
    /// CMAF chunk duration in milliseconds.
    pub chunk_duration: u64,
    /// Segments per MPD refresh window; 0 refreshes on a frame cadence.
    pub window_size: u64,
    /// Live presentation (`type="dynamic"` behaviours) vs static.
    pub is_live: bool,
    /// Emit the full-resolution base AdaptationSet.
    pub has_main_as: bool,
    /// Optional BaseURL element.
    pub base_url: Option<String>,
    /// Output directory; the MPD lands at `{dir_name}{out_name}.mpd`.
    pub dir_name: String,
    /// Output name prefix shared by the MPD and all segment files.
    pub out_name: String,
    /// Extractor tracks each segmenter thread handles; 0 picks the largest
    /// of 4/3/2/1 dividing the tile count.
    pub extractor_tracks_per_seg_thread: u8,
    /// CMAF service description target latency in milliseconds.
    pub target_latency: u64,
    pub min_latency: u64,
    pub max_latency: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            seg_duration: 1,
            chunk_duration: 0,
            window_size: 0,
            is_live: false,
            has_main_as: false,
            base_url: None,
            dir_name: "./".into(),
            out_name: "stream".into(),
            extractor_tracks_per_seg_thread: 0,
            target_latency: 3000,
            min_latency: 1000,
            max_latency: 10000,
        }
    }
}

/// Complete packager configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    pub proj_type: Projection,
    pub frame_rate: FrameRate,
    pub viewport: ViewportConfig,
    pub segmentation: SegmentationConfig,
    /// Initialise every packing generator with the largest observed
    /// selection size so all extractor tracks share one packed resolution.
    pub fixed_packed_pic_res: bool,
    pub cmaf_enabled: bool,
    /// Packing-generator backend, resolved by name from the registry.
    pub packing_plugin: String,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            proj_type: Projection::Erp,
            frame_rate: FrameRate::default(),
            viewport: ViewportConfig::default(),
            segmentation: SegmentationConfig::default(),
            fixed_packed_pic_res: false,
            cmaf_enabled: false,
            packing_plugin: "column".into(),
        }
    }
}

impl PackerConfig {
    /// Load a JSON job description.
    pub fn from_json_file(path: impl AsRef<Path>) -> PackerResult<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|err| {
            PackerError::null_input(format!(
                "config file {}: {err}",
                path.as_ref().display()
            ))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|err| PackerError::null_input(format!("config parse: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency before any planning work starts.
    pub fn validate(&self) -> PackerResult<()> {
        if !(-180.0..=180.0).contains(&self.viewport.yaw)
            || !(-90.0..=90.0).contains(&self.viewport.pitch)
        {
            return Err(PackerError::invalid_viewport(
                self.viewport.yaw,
                self.viewport.pitch,
            ));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(PackerError::null_input("viewport dimensions"));
        }
        if self.frame_rate.num == 0 || self.frame_rate.den == 0 {
            return Err(PackerError::null_input("frame rate"));
        }
        if self.segmentation.seg_duration == 0 {
            return Err(PackerError::null_input("segment duration"));
        }
        if self.segmentation.out_name.is_empty() {
            return Err(PackerError::null_input("output name"));
        }
        if self.cmaf_enabled && self.segmentation.chunk_duration == 0 {
            return Err(PackerError::null_input("chunk duration with CMAF enabled"));
        }
        if self.packing_plugin.is_empty() {
            return Err(PackerError::null_input("packing plugin name"));
        }
        Ok(())
    }

    /// The MPD path this configuration writes to.
    pub fn mpd_path(&self) -> String {
        format!(
            "{}{}.mpd",
            self.segmentation.dir_name, self.segmentation.out_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PackerConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_fields_are_caught() {
        let mut config = PackerConfig::default();
        config.viewport.yaw = 181.0;
        assert_eq!(config.validate().unwrap_err().kind(), "invalid_viewport");

        let mut config = PackerConfig::default();
        config.segmentation.seg_duration = 0;
        assert!(config.validate().is_err());

        let mut config = PackerConfig::default();
        config.cmaf_enabled = true;
        config.segmentation.chunk_duration = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_round_trip_keeps_projection() {
        let mut config = PackerConfig::default();
        config.proj_type = Projection::Cubemap;
        config.segmentation.is_live = true;
        let text = serde_json::to_string(&config).unwrap();
        let back: PackerConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.proj_type, Projection::Cubemap);
        assert!(back.segmentation.is_live);
    }

    #[test]
    fn frame_rate_millis_matches_ntsc_rates() {
        assert_eq!(FrameRate { num: 30000, den: 1001 }.millis(), 29970);
        assert_eq!(FrameRate { num: 24000, den: 1001 }.millis(), 23976);
        assert_eq!(FrameRate { num: 60000, den: 1001 }.millis(), 59940);
        assert_eq!(FrameRate { num: 25, den: 1 }.millis(), 25000);
    }

    #[test]
    fn mpd_path_concatenates_dir_and_name() {
        let mut config = PackerConfig::default();
        config.segmentation.dir_name = "/tmp/out/".into();
        config.segmentation.out_name = "venue".into();
        assert_eq!(config.mpd_path(), "/tmp/out/venue.mpd");
    }
}
