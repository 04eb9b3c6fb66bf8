use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::catalog::records::{DatasetSplit, Emotion, FileId};
use crate::config::DEFAULT_STORE_ROOT;

#[derive(Parser, Debug)]
#[command(name = "emoclip", about = "Emotion-labelled speech clip catalog: convert, analyze, curate and export")]
pub struct Cli {
    /// Config file (defaults to ./emoclip.toml or the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog store directory
    #[arg(long, global = true, default_value = DEFAULT_STORE_ROOT)]
    pub store: PathBuf,

    /// Account email for catalog commands
    #[arg(long, global = true, env = "EMOCLIP_EMAIL")]
    pub email: Option<String>,

    /// Account password for catalog commands
    #[arg(long, global = true, env = "EMOCLIP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert an MP3 or WAV file to canonical 16-bit PCM WAV
    Convert {
        input: PathBuf,
        /// Output path (defaults to the input name with .wav)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print duration, sample rate, channel count and average level
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Render a waveform PNG from a file path or URL
    Waveform {
        source: String,
        #[arg(short, long, default_value = "waveform.png")]
        output: PathBuf,
        /// Number of envelope buckets
        #[arg(long, default_value_t = 300)]
        samples: usize,
        #[arg(long, default_value_t = 800)]
        width: u32,
        #[arg(long, default_value_t = 80)]
        height: u32,
        /// Device pixel ratio
        #[arg(long, default_value_t = 1.0)]
        dpr: f32,
        #[arg(long, value_enum, default_value_t = Mode::Progress)]
        mode: Mode,
        /// Playback progress (0.0-1.0)
        #[arg(long, default_value_t = 0.0)]
        progress: f64,
        /// Simulate a click at this x offset (logical pixels) instead of --progress
        #[arg(long)]
        seek_x: Option<f64>,
        /// Played color (#rrggbb)
        #[arg(long)]
        played: Option<String>,
        /// Unplayed color (#rrggbb)
        #[arg(long)]
        unplayed: Option<String>,
    },

    /// Play a file silently through the realtime analyzer and show a level meter
    Meter {
        input: PathBuf,
        #[arg(long, default_value_t = 3.0)]
        seconds: f64,
    },

    /// Upload a new clip
    Upload {
        input: PathBuf,
        #[arg(long)]
        uploaded_by: String,
        #[arg(long)]
        emotion: Option<Emotion>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        split: Option<DatasetSplit>,
    },

    /// Upload a replacement recording as the next version of a clip
    NewVersion {
        id: FileId,
        input: PathBuf,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show version history of a clip
    Versions { id: FileId },

    /// Make an earlier version current again
    Restore { id: FileId, version: u32 },

    /// List clips
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        json: bool,
    },

    /// Set emotion, description and split of a clip (omitted fields are cleared)
    Edit {
        id: FileId,
        #[arg(long)]
        emotion: Option<Emotion>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        split: Option<DatasetSplit>,
    },

    /// Delete a clip with all of its versions
    Delete { id: FileId },

    /// Delete several clips
    BulkDelete {
        #[arg(required = true)]
        ids: Vec<FileId>,
    },

    /// Assign clips to a dataset split
    Assign {
        split: DatasetSplit,
        #[arg(required = true)]
        ids: Vec<FileId>,
    },

    /// Export the catalog as CSV or JSON
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply split/emotion/description changes from a CSV sheet
    Import { input: PathBuf },

    /// Download clips as a ZIP archive (by ids, by --split, or everything)
    Download {
        ids: Vec<FileId>,
        #[arg(long)]
        split: Option<DatasetSplit>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-member and per-emotion progress toward the clip target
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Print a time-limited URL for a clip's current audio
    Url {
        id: FileId,
        /// Lifetime in seconds (defaults to the configured TTL)
        #[arg(long)]
        ttl: Option<u64>,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    #[arg(long)]
    pub emotion: Option<Emotion>,
    /// Minimum duration in seconds
    #[arg(long)]
    pub min_duration: Option<f64>,
    /// Maximum duration in seconds
    #[arg(long)]
    pub max_duration: Option<f64>,
    #[arg(long)]
    pub sample_rate: Option<u32>,
    #[arg(long, value_enum)]
    pub channels: Option<Channels>,
    /// Minimum file size in MB
    #[arg(long)]
    pub min_size: Option<f64>,
    /// Maximum file size in MB
    #[arg(long)]
    pub max_size: Option<f64>,
    #[arg(long)]
    pub split: Option<DatasetSplit>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Overlay,
    Progress,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    Mono,
    Stereo,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}
