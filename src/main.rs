use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use omaf_dash_packer::streams::{AudioStream, MediaStream, SourceLayer, StreamSet};
use omaf_dash_packer::{build_presentation, PackerConfig};

/// Package tiled 360° HEVC streams into an OMAF DASH presentation:
/// plans one extractor track per distinct viewport, rewrites SPS/PPS for
/// each packed picture, and emits the MPD.
#[derive(Parser, Debug)]
#[command(name = "omafpack")]
#[command(about = "Plan OMAF extractor tracks and emit a DASH MPD for tiled 360 video")]
struct Args {
    /// JSON job description (config + stream list)
    job: PathBuf,

    /// Total frame count for static presentations
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// Override the output directory from the job file
    #[arg(short, long)]
    out_dir: Option<String>,

    /// Force a live (dynamic) presentation
    #[arg(long)]
    live: bool,

    /// Force CMAF chunked low-latency output
    #[arg(long)]
    cmaf: bool,
}

/// The JSON job file: packager configuration plus the input streams.
#[derive(Debug, Deserialize)]
struct JobFile {
    #[serde(default)]
    config: PackerConfig,
    streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamEntry {
    Video {
        width: u32,
        height: u32,
        tile_cols: u8,
        tile_rows: u8,
        bitrate: u64,
        #[serde(default = "default_gop")]
        gop_size: u32,
        /// Start-coded parameter-set files produced by the encoder.
        vps: PathBuf,
        sps: PathBuf,
        pps: PathBuf,
    },
    Audio {
        sampling_rate: u32,
        channel_config: u32,
        bitrate: u64,
    },
}

fn default_gop() -> u32 {
    30
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let text = fs::read_to_string(&args.job)
        .with_context(|| format!("reading job file {}", args.job.display()))?;
    let job: JobFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing job file {}", args.job.display()))?;

    let mut config = job.config;
    if let Some(out_dir) = args.out_dir {
        config.segmentation.dir_name = out_dir;
    }
    if args.live {
        config.segmentation.is_live = true;
    }
    if args.cmaf {
        config.cmaf_enabled = true;
    }
    config.validate()?;

    let base_dir = args.job.parent().unwrap_or(Path::new("."));
    let streams = load_streams(&job.streams, base_dir, config.proj_type)?;

    let summary = build_presentation(&config, &streams, args.frames)?;

    println!("Packing plan complete:");
    println!("  Viewports: {}", summary.viewport_count);
    println!("  Extractor tracks: {}", summary.extractor_tracks);
    println!("  Selection sizes: {:?}", summary.selection_sizes);
    println!(
        "  Tracks per segmenter thread: {}",
        summary.extractor_tracks_per_seg_thread
    );
    println!("  MPD: {}", summary.mpd_path.display());
    Ok(())
}

/// Materialise the job's stream list, reading parameter-set files relative
/// to the job file's directory.
fn load_streams(
    entries: &[StreamEntry],
    base_dir: &Path,
    projection: omaf_dash_packer::Projection,
) -> Result<StreamSet> {
    let mut streams = BTreeMap::new();
    let mut video_count = 0u8;
    for (idx, entry) in entries.iter().enumerate() {
        let stream = match entry {
            StreamEntry::Video {
                width,
                height,
                tile_cols,
                tile_rows,
                bitrate,
                gop_size,
                vps,
                sps,
                pps,
            } => {
                video_count += 1;
                MediaStream::Video(SourceLayer {
                    width: *width,
                    height: *height,
                    tile_cols: *tile_cols,
                    tile_rows: *tile_rows,
                    bitrate: *bitrate,
                    gop_size: *gop_size,
                    vps: read_nal(base_dir, vps)?,
                    sps: read_nal(base_dir, sps)?,
                    pps: read_nal(base_dir, pps)?,
                })
            }
            StreamEntry::Audio { sampling_rate, channel_config, bitrate } => {
                MediaStream::Audio(AudioStream {
                    sampling_rate: *sampling_rate,
                    channel_config: *channel_config,
                    bitrate: *bitrate,
                })
            }
        };
        streams.insert(idx as u8, stream);
    }
    Ok(StreamSet::new(streams, video_count, projection)?)
}

fn read_nal(base_dir: &Path, path: &Path) -> Result<Vec<u8>> {
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    fs::read(&resolved).with_context(|| format!("reading parameter set {}", resolved.display()))
}
