//! # OMAF DASH MPD Emitter
//!
//! Serialises the packing plan and stream metadata as an OMAF-compliant
//! DASH MPD. The document carries, per period:
//!
//! - an optional "base" AdaptationSet with the full-resolution main layer
//!   (and, for planar content, a 2D region quality ranking),
//! - one AdaptationSet per tile track with its SRD position and a
//!   region-wise packing property,
//! - one AdaptationSet per extractor track with RWPK, sphere-region
//!   quality ranking and the Preselection binding it to its tile tracks,
//! - one AdaptationSet per audio stream.
//!
//! Live presentations refresh the file on a window cadence; CMAF adds the
//! low-latency surface (`Resync`, `availabilityTimeOffset`,
//! `ProducerReferenceTime`, `ServiceDescription/Latency`). The XML document
//! is rebuilt from scratch on every write and the previous file unlinked
//! first.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use xmlwriter::{Options, XmlWriter};

use crate::config::PackerConfig;
use crate::error::{PackerError, PackerResult};
use crate::planner::track::ExtractorTrack;
use crate::streams::{SourceLayer, StreamSet};
use omaf_geom::Projection;

mod schema {
    pub const XMLNS: &str = "urn:mpeg:dash:schema:mpd:2011";
    pub const XMLNS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    pub const XMLNS_OMAF: &str = "urn:mpeg:mpegI:omaf:2017";
    pub const XMLNS_XLINK: &str = "http://www.w3.org/1999/xlink";
    pub const SCHEMA_LOCATION: &str = "urn:mpeg:dash:schema:mpd:2011 DASH-MPD.xsd";

    pub const PROFILE_LIVE: &str = "urn:mpeg:dash:profile:isoff-live:2011";
    pub const PROFILE_ON_DEMAND: &str = "urn:mpeg:dash:profile:isoff-on-demand:2011";

    pub const SCHEME_PF: &str = "urn:mpeg:mpegI:omaf:2017:pf";
    pub const SCHEME_RWPK: &str = "urn:mpeg:mpegI:omaf:2017:rwpk";
    pub const SCHEME_SRQR: &str = "urn:mpeg:mpegI:omaf:2017:srqr";
    pub const SCHEME_2DQR: &str = "urn:mpeg:mpegI:omaf:2017:2dqr";
    pub const SCHEME_SRD: &str = "urn:mpeg:dash:srd:2014";
    pub const SCHEME_PRESELECTION: &str = "urn:mpeg:dash:preselection:2016";
    pub const SCHEME_VIEWPOINT: &str = "urn:mpeg:dash:viewpoint:2011";
    pub const SCHEME_AUDIO_CHANNELS: &str = "urn:mpeg:mpegB:cicp:ChannelConfiguration";
    pub const SCHEME_UTC: &str = "urn:mpeg:dash:utc:http-xsdate:2014";
    pub const UTC_SOURCE: &str = "https://time.akamai.com/?iso";

    pub const MIME_VIDEO: &str = "video/mp4";
    pub const MIME_AUDIO: &str = "audio/mp4";
    pub const CODECS_TILE: &str = "hvc1.1.6.L93.B0";
    pub const CODECS_EXTRACTOR: &str = "hvc2.1.6.L93.B0";
    pub const CODECS_AUDIO: &str = "mp4a.40.2";
}

/// Writes and refreshes the presentation's MPD file.
pub struct MpdWriter<'a> {
    streams: &'a StreamSet,
    /// Extractor tracks in emission order: cardinality ascending, then
    /// viewport id.
    tracks: Vec<&'a ExtractorTrack>,
    config: &'a PackerConfig,
    timescale: u64,
    mini_update_period: u64,
    mpd_path: PathBuf,
    available_start_time: Option<String>,
    current_seg: u64,
}

impl<'a> MpdWriter<'a> {
    /// Prepare the writer: create the output directory if needed and derive
    /// the corrected timescale from the frame rate.
    pub fn new(
        streams: &'a StreamSet,
        tracks: &'a BTreeMap<u16, ExtractorTrack>,
        config: &'a PackerConfig,
    ) -> PackerResult<Self> {
        let seg = &config.segmentation;
        let dir = Path::new(&seg.dir_name);
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| PackerError::CreateFolderFailure {
                path: seg.dir_name.clone(),
                source,
            })?;
        }

        let mut ordered: Vec<&ExtractorTrack> = tracks.values().collect();
        ordered.sort_by_key(|t| (t.selection.len(), t.viewport_id));

        Ok(Self {
            streams,
            tracks: ordered,
            config,
            timescale: corrected_timescale(config.frame_rate.millis()),
            mini_update_period: seg.seg_duration * seg.window_size.max(1),
            mpd_path: PathBuf::from(config.mpd_path()),
            available_start_time: None,
            current_seg: 0,
        })
    }

    pub fn mpd_path(&self) -> &Path {
        &self.mpd_path
    }

    /// Write the complete MPD for `total_frames` frames of content.
    pub fn write_mpd(&mut self, total_frames: u64) -> PackerResult<()> {
        let xml = self.render(total_frames)?;
        let document = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{xml}");
        fs::write(&self.mpd_path, document)
            .map_err(|err| PackerError::xml(format!("writing {:?}: {err}", self.mpd_path)))?;
        info!("MPD written to {:?}", self.mpd_path);
        Ok(())
    }

    /// Live refresh hook, called by the segmenter driver after every
    /// flushed segment. Rewrites the file once per window (or on the frame
    /// cadence when no window is configured); off-cadence calls only record
    /// the segment number.
    pub fn update_mpd(&mut self, seg_number: u64, frames_number: u64) -> PackerResult<()> {
        self.current_seg = seg_number;
        let seg = &self.config.segmentation;

        let due = if seg.window_size > 0 {
            seg_number % seg.window_size == 1
        } else {
            let frames_per_seg = seg.seg_duration * self.config.frame_rate.rounded();
            frames_per_seg > 0 && frames_number % frames_per_seg == 0
        };
        if !due {
            return Ok(());
        }

        match fs::metadata(&self.mpd_path) {
            Ok(_) => {
                fs::remove_file(&self.mpd_path).map_err(|source| {
                    PackerError::RealpathFailure {
                        path: self.mpd_path.display().to_string(),
                        source,
                    }
                })?;
            }
            Err(source) => {
                // The very first window legitimately has no file yet.
                let first_window = seg.window_size > 0 && seg_number <= 1;
                if !first_window {
                    return Err(PackerError::RealpathFailure {
                        path: self.mpd_path.display().to_string(),
                        source,
                    });
                }
            }
        }

        self.write_mpd(frames_number)
    }

    fn render(&mut self, total_frames: u64) -> PackerResult<String> {
        let seg = &self.config.segmentation;
        let mut xml = XmlWriter::new(Options::default());

        xml.start_element("MPD");
        xml.write_attribute("xmlns:omaf", schema::XMLNS_OMAF);
        xml.write_attribute("xmlns:xsi", schema::XMLNS_XSI);
        xml.write_attribute("xmlns", schema::XMLNS);
        xml.write_attribute("xmlns:xlink", schema::XMLNS_XLINK);
        xml.write_attribute("xsi:schemaLocation", schema::SCHEMA_LOCATION);
        xml.write_attribute_fmt(
            "minBufferTime",
            format_args!("PT{:.6}S", seg.seg_duration as f64),
        );
        xml.write_attribute_fmt(
            "maxSegmentDuration",
            format_args!("PT{:.6}S", seg.seg_duration as f64),
        );
        if seg.is_live {
            xml.write_attribute("profiles", schema::PROFILE_LIVE);
            xml.write_attribute("type", "dynamic");
        } else {
            xml.write_attribute("profiles", schema::PROFILE_ON_DEMAND);
            xml.write_attribute("type", "static");
        }

        let mut presentation_duration = None;
        if seg.is_live {
            let now = format_utc_now()?;
            if self.available_start_time.is_none() || self.config.cmaf_enabled {
                self.available_start_time = Some(now.clone());
            }
            xml.write_attribute(
                "availabilityStartTime",
                self.available_start_time.as_ref().expect("set above"),
            );
            xml.write_attribute("timeShiftBufferDepth", "PT5M");
            xml.write_attribute_fmt(
                "minimumUpdatePeriod",
                format_args!("PT{}S", self.mini_update_period),
            );
            xml.write_attribute("publishTime", &now);
        } else {
            let duration = presentation_duration_string(
                total_frames,
                corrected_fps(self.config.frame_rate.millis()),
            );
            xml.write_attribute("mediaPresentationDuration", &duration);
            presentation_duration = Some(duration);
        }

        xml.start_element("EssentialProperty");
        xml.write_attribute("schemeIdUri", schema::SCHEME_PF);
        xml.write_attribute_fmt(
            "omaf:projection_type",
            format_args!("{}", self.config.proj_type.omaf_projection_type()),
        );
        xml.end_element();

        if let Some(base_url) = &seg.base_url {
            xml.start_element("BaseURL");
            xml.write_text(base_url);
            xml.end_element();
        }

        if self.config.cmaf_enabled && seg.is_live {
            xml.start_element("ServiceDescription");
            xml.write_attribute("id", "0");
            xml.start_element("Latency");
            xml.write_attribute_fmt("target", format_args!("{}", seg.target_latency));
            xml.write_attribute_fmt("min", format_args!("{}", seg.min_latency));
            xml.write_attribute_fmt("max", format_args!("{}", seg.max_latency));
            xml.write_attribute("referenceId", "0");
            xml.end_element();
            xml.end_element();
        }

        xml.start_element("Period");
        if seg.is_live {
            xml.write_attribute("start", "PT0H0M0.000S");
            xml.write_attribute("id", "P1");
        } else {
            xml.write_attribute(
                "duration",
                presentation_duration.as_deref().expect("static branch"),
            );
        }

        if seg.has_main_as {
            self.write_base_adaptation_set(&mut xml)?;
        }

        for (layer_idx, layer) in self.streams.video_layers().enumerate() {
            for tile_idx in 0..layer.tile_count() {
                self.write_tile_adaptation_set(&mut xml, layer_idx, layer, tile_idx)?;
            }
        }

        for (audio_idx, audio) in self.streams.audio_streams().enumerate() {
            let index = self.audio_track_index(audio_idx);
            xml.start_element("AdaptationSet");
            xml.write_attribute_fmt("id", format_args!("{index}"));
            xml.write_attribute("mimeType", schema::MIME_AUDIO);
            xml.write_attribute("codecs", schema::CODECS_AUDIO);
            xml.write_attribute_fmt(
                "audioSamplingRate",
                format_args!("{}", audio.sampling_rate),
            );
            xml.write_attribute("segmentAlignment", "1");
            xml.write_attribute("subsegmentAlignment", "1");

            xml.start_element("Representation");
            xml.write_attribute_fmt(
                "id",
                format_args!("{}_track{index}", seg.out_name),
            );
            xml.write_attribute_fmt("bandwidth", format_args!("{}", audio.bitrate));
            xml.write_attribute_fmt(
                "audioSamplingRate",
                format_args!("{}", audio.sampling_rate),
            );
            xml.write_attribute("startWithSAP", "1");

            xml.start_element("AudioChannelConfiguration");
            xml.write_attribute("schemeIdUri", schema::SCHEME_AUDIO_CHANNELS);
            xml.write_attribute_fmt("value", format_args!("{}", audio.channel_config));
            xml.end_element();

            self.write_segment_template(&mut xml, index, true);
            xml.end_element(); // Representation
            xml.end_element(); // AdaptationSet
        }

        for (order_idx, track) in self.tracks.iter().enumerate() {
            self.write_extractor_adaptation_set(&mut xml, order_idx, track)?;
        }

        xml.end_element(); // Period
        xml.end_element(); // MPD
        Ok(xml.end_document())
    }

    fn write_base_adaptation_set(&self, xml: &mut XmlWriter) -> PackerResult<()> {
        let main = self.streams.main_layer();

        xml.start_element("AdaptationSet");
        xml.write_attribute("id", "0");
        xml.write_attribute("mimeType", schema::MIME_VIDEO);
        xml.write_attribute("codecs", schema::CODECS_TILE);
        xml.write_attribute("segmentAlignment", "1");
        xml.write_attribute_fmt("maxWidth", format_args!("{}", main.width));
        xml.write_attribute_fmt("maxHeight", format_args!("{}", main.height));
        xml.write_attribute_fmt("gopSize", format_args!("{}", main.gop_size));
        xml.write_attribute("bitstreamSwitching", "false");

        self.write_viewpoint(xml);

        xml.start_element("EssentialProperty");
        xml.write_attribute("schemeIdUri", schema::SCHEME_SRD);
        xml.write_attribute("value", "1,0,0,0,0");
        xml.end_element();

        if self.config.proj_type == Projection::Planar {
            xml.start_element("SupplementalProperty");
            xml.write_attribute("schemeIdUri", schema::SCHEME_2DQR);
            xml.start_element("omaf:twoDRegionQuality");
            for (layer_idx, layer) in self.streams.video_layers().enumerate() {
                xml.start_element("omaf:qualityInfo");
                xml.write_attribute_fmt(
                    "quality_ranking",
                    format_args!("{}", self.streams.quality_ranking(layer_idx)),
                );
                xml.write_attribute_fmt("orig_width", format_args!("{}", layer.width));
                xml.write_attribute_fmt("orig_height", format_args!("{}", layer.height));
                xml.write_attribute_fmt(
                    "region_width",
                    format_args!("{}", layer.tile_width()),
                );
                xml.write_attribute_fmt(
                    "region_height",
                    format_args!("{}", layer.tile_height()),
                );
                xml.end_element();
            }
            xml.end_element(); // twoDRegionQuality
            xml.end_element(); // SupplementalProperty
        }

        xml.start_element("Representation");
        xml.write_attribute("id", "0");
        xml.write_attribute("mimeType", schema::MIME_VIDEO);
        xml.write_attribute("codecs", schema::CODECS_TILE);
        xml.write_attribute_fmt("width", format_args!("{}", main.width));
        xml.write_attribute_fmt("height", format_args!("{}", main.height));
        self.write_frame_rate(xml, "frameRate");
        xml.write_attribute("sar", "1:1");
        xml.write_attribute("startWithSAP", "1");

        xml.start_element("SegmentTemplate");
        xml.write_attribute_fmt("timescale", format_args!("{}", self.timescale));
        xml.write_attribute_fmt(
            "duration",
            format_args!("{}", self.config.segmentation.seg_duration * self.timescale),
        );
        xml.write_attribute("media", "track0_$Number$.m4s");
        xml.write_attribute("startNumber", "1");
        xml.end_element();

        xml.end_element(); // Representation
        xml.end_element(); // AdaptationSet
        Ok(())
    }

    fn write_tile_adaptation_set(
        &self,
        xml: &mut XmlWriter,
        layer_idx: usize,
        layer: &SourceLayer,
        tile_idx: u32,
    ) -> PackerResult<()> {
        let index = self.tile_track_index(layer_idx, tile_idx);
        let tile_w = layer.tile_width();
        let tile_h = layer.tile_height();
        let tile_x = (tile_idx % layer.tile_cols as u32) * tile_w;
        let tile_y = (tile_idx / layer.tile_cols as u32) * tile_h;

        xml.start_element("AdaptationSet");
        xml.write_attribute_fmt("id", format_args!("{index}"));
        xml.write_attribute("mimeType", schema::MIME_VIDEO);
        xml.write_attribute("codecs", schema::CODECS_TILE);
        xml.write_attribute_fmt("maxWidth", format_args!("{tile_w}"));
        xml.write_attribute_fmt("maxHeight", format_args!("{tile_h}"));
        self.write_frame_rate(xml, "maxFrameRate");
        xml.write_attribute("segmentAlignment", "1");
        xml.write_attribute("subsegmentAlignment", "1");

        self.write_viewpoint(xml);

        // Tile position: picture coordinates for ERP/planar, face-mosaic
        // coordinates (already baked into x/y) for cubemap.
        xml.start_element("SupplementalProperty");
        xml.write_attribute("schemeIdUri", schema::SCHEME_SRD);
        xml.write_attribute_fmt(
            "value",
            format_args!("1,{tile_x},{tile_y},{tile_w},{tile_h}"),
        );
        xml.end_element();

        xml.start_element("EssentialProperty");
        xml.write_attribute("schemeIdUri", schema::SCHEME_RWPK);
        xml.write_attribute("omaf:packing_type", "0");
        xml.end_element();

        if self.config.cmaf_enabled && self.config.segmentation.is_live {
            self.write_producer_reference_time(xml)?;
        }

        xml.start_element("Representation");
        xml.write_attribute_fmt(
            "id",
            format_args!("{}_track{index}", self.config.segmentation.out_name),
        );
        xml.write_attribute_fmt(
            "qualityRanking",
            format_args!("{}", self.streams.quality_ranking(layer_idx)),
        );
        xml.write_attribute_fmt(
            "bandwidth",
            format_args!("{}", layer.bitrate / layer.tile_count() as u64),
        );
        xml.write_attribute_fmt("width", format_args!("{tile_w}"));
        xml.write_attribute_fmt("height", format_args!("{tile_h}"));
        self.write_frame_rate(xml, "frameRate");
        xml.write_attribute("sar", "1:1");
        xml.write_attribute("startWithSAP", "1");

        self.write_resync(xml);
        self.write_segment_template(xml, index, false);
        xml.end_element(); // Representation
        xml.end_element(); // AdaptationSet
        Ok(())
    }

    fn write_extractor_adaptation_set(
        &self,
        xml: &mut XmlWriter,
        order_idx: usize,
        track: &ExtractorTrack,
    ) -> PackerResult<()> {
        let index = self.extractor_track_index(order_idx);

        xml.start_element("AdaptationSet");
        xml.write_attribute_fmt("id", format_args!("{index}"));
        xml.write_attribute("mimeType", schema::MIME_VIDEO);
        xml.write_attribute("codecs", schema::CODECS_EXTRACTOR);
        xml.write_attribute_fmt("maxWidth", format_args!("{}", track.packed_width));
        xml.write_attribute_fmt("maxHeight", format_args!("{}", track.packed_height));
        self.write_frame_rate(xml, "maxFrameRate");
        xml.write_attribute("segmentAlignment", "1");
        xml.write_attribute("subsegmentAlignment", "1");

        self.write_viewpoint(xml);

        xml.start_element("EssentialProperty");
        xml.write_attribute("schemeIdUri", schema::SCHEME_RWPK);
        xml.write_attribute("omaf:packing_type", "0");
        xml.end_element();

        if self.config.cmaf_enabled && self.config.segmentation.is_live {
            self.write_producer_reference_time(xml)?;
        }

        xml.start_element("SupplementalProperty");
        xml.write_attribute("schemeIdUri", schema::SCHEME_SRQR);
        xml.start_element("omaf:sphRegionQuality");
        xml.write_attribute_fmt(
            "shape_type",
            format_args!("{}", track.coverage.shape_type),
        );
        xml.write_attribute("remaining_area_flag", "false");
        xml.write_attribute("quality_ranking_local_flag", "false");
        xml.write_attribute("quality_type", "0");
        let sphere = track.coverage.regions.first();
        for (layer_idx, layer) in self.streams.video_layers().enumerate() {
            xml.start_element("omaf:qualityInfo");
            xml.write_attribute_fmt(
                "quality_ranking",
                format_args!("{}", self.streams.quality_ranking(layer_idx)),
            );
            xml.write_attribute_fmt("orig_width", format_args!("{}", layer.width));
            xml.write_attribute_fmt("orig_height", format_args!("{}", layer.height));
            if let Some(region) = sphere {
                xml.write_attribute_fmt(
                    "centre_azimuth",
                    format_args!("{}", region.centre_azimuth),
                );
                xml.write_attribute_fmt(
                    "centre_elevation",
                    format_args!("{}", region.centre_elevation),
                );
                xml.write_attribute_fmt("centre_tilt", format_args!("{}", region.centre_tilt));
                xml.write_attribute_fmt(
                    "azimuth_range",
                    format_args!("{}", region.azimuth_range),
                );
                xml.write_attribute_fmt(
                    "elevation_range",
                    format_args!("{}", region.elevation_range),
                );
            }
            xml.end_element();
        }
        xml.end_element(); // sphRegionQuality
        xml.end_element(); // SupplementalProperty

        xml.start_element("SupplementalProperty");
        xml.write_attribute("schemeIdUri", schema::SCHEME_PRESELECTION);
        xml.write_attribute("value", &self.preselection_value(index, track));
        xml.end_element();

        xml.start_element("Representation");
        xml.write_attribute_fmt(
            "id",
            format_args!("{}_track{index}", self.config.segmentation.out_name),
        );
        xml.write_attribute_fmt("width", format_args!("{}", track.packed_width));
        xml.write_attribute_fmt("height", format_args!("{}", track.packed_height));
        self.write_frame_rate(xml, "frameRate");

        self.write_resync(xml);
        self.write_segment_template(xml, index, false);
        xml.end_element(); // Representation
        xml.end_element(); // AdaptationSet
        Ok(())
    }

    /// `"extK,K T1 T2 … "` — the extractor's own index, then the tile
    /// tracks of its selection in the main layer.
    fn preselection_value(&self, index: u32, track: &ExtractorTrack) -> String {
        let main = self.streams.main_layer();
        let tile_w = main.tile_width();
        let tile_h = main.tile_height();
        let refs: BTreeSet<u32> = track
            .selection
            .iter()
            .map(|tile| {
                let col = tile.x / tile_w;
                let row = tile.y / tile_h;
                self.tile_track_index(0, row * main.tile_cols as u32 + col)
            })
            .collect();

        let mut value = format!("ext{index},{index} ");
        for tile_ref in refs {
            value.push_str(&format!("{tile_ref} "));
        }
        value
    }

    fn write_viewpoint(&self, xml: &mut XmlWriter) {
        xml.start_element("Viewpoint");
        xml.write_attribute("schemeIdUri", schema::SCHEME_VIEWPOINT);
        xml.write_attribute("value", "vpl");
        xml.end_element();
    }

    fn write_frame_rate(&self, xml: &mut XmlWriter, attribute: &str) {
        xml.write_attribute_fmt(
            attribute,
            format_args!(
                "{}/{}",
                self.config.frame_rate.num, self.config.frame_rate.den
            ),
        );
    }

    fn write_resync(&self, xml: &mut XmlWriter) {
        if self.config.cmaf_enabled {
            xml.start_element("Resync");
            xml.write_attribute("type", "0");
            xml.write_attribute_fmt(
                "dt",
                format_args!("{}", self.config.segmentation.chunk_duration),
            );
            xml.end_element();
        }
    }

    fn write_producer_reference_time(&self, xml: &mut XmlWriter) -> PackerResult<()> {
        xml.start_element("ProducerReferenceTime");
        xml.write_attribute("id", "0");
        xml.write_attribute("inband", "true");
        xml.write_attribute("type", "encoder");
        xml.write_attribute("wallClockTime", &format_utc_now()?);
        xml.write_attribute("presentationTime", "0");

        xml.start_element("UTCTiming");
        xml.write_attribute("schemeIdUri", schema::SCHEME_UTC);
        xml.write_attribute("value", schema::UTC_SOURCE);
        xml.end_element();

        xml.end_element();
        Ok(())
    }

    fn write_segment_template(&self, xml: &mut XmlWriter, track_index: u32, audio: bool) {
        let seg = &self.config.segmentation;
        xml.start_element("SegmentTemplate");
        xml.write_attribute_fmt(
            "media",
            format_args!("{}_track{track_index}.$Number$.mp4", seg.out_name),
        );
        xml.write_attribute_fmt(
            "initialization",
            format_args!("{}_track{track_index}.init.mp4", seg.out_name),
        );
        xml.write_attribute_fmt(
            "duration",
            format_args!("{}", seg.seg_duration * self.timescale),
        );
        if audio || !self.config.cmaf_enabled || !seg.is_live {
            xml.write_attribute("startNumber", "1");
        } else {
            xml.write_attribute_fmt("startNumber", format_args!("{}", self.current_seg));
        }
        xml.write_attribute_fmt("timescale", format_args!("{}", self.timescale));
        if !audio && self.config.cmaf_enabled {
            xml.write_attribute_fmt(
                "availabilityTimeOffset",
                format_args!("{:.6}", seg.seg_duration as f64 / 2.0),
            );
            xml.write_attribute("availabilityTimeComplete", "false");
        }
        xml.end_element();
    }

    /// Tile tracks are numbered 1.. per layer in bitrate order, then audio
    /// tracks, then extractor tracks.
    fn tile_track_index(&self, layer_idx: usize, tile_idx: u32) -> u32 {
        let before: u32 = self
            .streams
            .video_layers()
            .take(layer_idx)
            .map(SourceLayer::tile_count)
            .sum();
        1 + before + tile_idx
    }

    fn audio_track_index(&self, audio_idx: usize) -> u32 {
        let tiles: u32 = self.streams.video_layers().map(SourceLayer::tile_count).sum();
        1 + tiles + audio_idx as u32
    }

    fn extractor_track_index(&self, order_idx: usize) -> u32 {
        let tiles: u32 = self.streams.video_layers().map(SourceLayer::tile_count).sum();
        let audio = self.streams.audio_streams().count() as u32;
        1 + tiles + audio + order_idx as u32
    }
}

/// NTSC-family frame rates are corrected to their integer timescales.
fn corrected_fps(fps_millis: u64) -> u64 {
    match fps_millis {
        29970 => 30000,
        23976 => 24000,
        59940 => 60000,
        other => other,
    }
}

fn corrected_timescale(fps_millis: u64) -> u64 {
    corrected_fps(fps_millis)
}

/// `PT%02dH%02dM%02d.%03dS` from the frame count and corrected fps.
fn presentation_duration_string(total_frames: u64, corrected_fps: u64) -> String {
    let total_ms = (total_frames as f64 * 1000.0 / (corrected_fps as f64 / 1000.0)) as u64;
    let hours = total_ms / 3_600_000;
    let rem = total_ms % 3_600_000;
    let minutes = rem / 60_000;
    let rem = rem % 60_000;
    let seconds = rem / 1000;
    let millis = rem % 1000;
    format!("PT{hours:02}H{minutes:02}M{seconds:02}.{millis:03}S")
}

/// Current wall-clock time as `YYYY-MM-DDTHH:MM:SSZ`.
fn format_utc_now() -> PackerResult<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| PackerError::invalid_time(err.to_string()))?
        .as_secs();
    let days = (now / 86_400) as i64;
    let tod = now % 86_400;

    // Civil date from the day count (Gregorian, proleptic).
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };

    Ok(format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timescales_follow_the_correction_table() {
        assert_eq!(corrected_timescale(29970), 30000);
        assert_eq!(corrected_timescale(23976), 24000);
        assert_eq!(corrected_timescale(59940), 60000);
        assert_eq!(corrected_timescale(25000), 25000);
    }

    #[test]
    fn one_hour_at_ntsc_rate_formats_cleanly() {
        assert_eq!(
            presentation_duration_string(108_000, 30000),
            "PT01H00M00.000S"
        );
        assert_eq!(
            presentation_duration_string(90, 30000),
            "PT00H00M03.000S"
        );
    }

    #[test]
    fn utc_formatting_is_iso_shaped() {
        let stamp = format_utc_now().unwrap();
        assert_eq!(stamp.len(), 20);
        assert!(stamp.ends_with('Z'));
        assert_eq!(&stamp[4..5], "-");
        assert_eq!(&stamp[10..11], "T");
    }
}
