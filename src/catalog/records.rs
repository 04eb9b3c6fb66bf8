use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::convert::SourceFormat;
use crate::audio::metadata::AudioMetadata;

pub type FileId = u64;

pub const WAV_MIME: &str = "audio/wav";

#[derive(Debug, Error)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseLabelError {
    kind: &'static str,
    value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Fearful,
    Surprised,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fearful,
        Emotion::Surprised,
        Emotion::Neutral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fearful => "fearful",
            Emotion::Surprised => "surprised",
            Emotion::Neutral => "neutral",
        }
    }

    /// Label used by the team's Turkish-language sheets.
    pub fn turkish_label(self) -> &'static str {
        match self {
            Emotion::Happy => "Mutlu",
            Emotion::Sad => "Üzgün",
            Emotion::Angry => "Kızgın",
            Emotion::Fearful => "Korkulu",
            Emotion::Surprised => "Şaşkın",
            Emotion::Neutral => "Nötr",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == needle || e.turkish_label().to_lowercase() == needle)
            .ok_or_else(|| ParseLabelError {
                kind: "emotion",
                value: s.to_string(),
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSplit {
    Train,
    Test,
    Validation,
}

impl DatasetSplit {
    pub const ALL: [DatasetSplit; 3] = [DatasetSplit::Train, DatasetSplit::Test, DatasetSplit::Validation];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Test => "test",
            DatasetSplit::Validation => "validation",
        }
    }
}

impl fmt::Display for DatasetSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetSplit {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        DatasetSplit::ALL
            .into_iter()
            .find(|d| d.as_str() == needle)
            .ok_or_else(|| ParseLabelError {
                kind: "dataset split",
                value: s.to_string(),
            })
    }
}

/// One catalog entry. Blob and metadata fields always describe the current version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub original_file_size: u64,
    pub mime_type: String,
    pub original_format: SourceFormat,
    pub is_converted: bool,
    pub uploaded_by: String,
    pub emotion: Option<Emotion>,
    pub description: Option<String>,
    pub dataset_type: Option<DatasetSplit>,
    pub current_version: u32,
    pub metadata: Option<AudioMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn duration(&self) -> Option<f64> {
        self.metadata.as_ref().map(|m| m.duration_seconds)
    }

    pub fn size_mb(&self) -> f64 {
        self.file_size as f64 / 1024.0 / 1024.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub audio_file_id: FileId,
    pub version_number: u32,
    pub file_path: String,
    pub file_size: u64,
    pub original_format: SourceFormat,
    pub is_converted: bool,
    pub uploaded_by: String,
    pub notes: Option<String>,
    pub metadata: Option<AudioMetadata>,
    pub created_at: DateTime<Utc>,
}

/// A file record before the store assigns its id and timestamps.
#[derive(Clone, Debug)]
pub struct FileDraft {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub original_file_size: u64,
    pub original_format: SourceFormat,
    pub is_converted: bool,
    pub uploaded_by: String,
    pub emotion: Option<Emotion>,
    pub description: Option<String>,
    pub dataset_type: Option<DatasetSplit>,
    pub metadata: Option<AudioMetadata>,
}

impl FileDraft {
    pub fn into_record(self, id: FileId, now: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id,
            filename: self.filename,
            original_filename: self.original_filename,
            file_path: self.file_path,
            file_size: self.file_size,
            original_file_size: self.original_file_size,
            mime_type: WAV_MIME.to_string(),
            original_format: self.original_format,
            is_converted: self.is_converted,
            uploaded_by: self.uploaded_by,
            emotion: self.emotion,
            description: self.description,
            dataset_type: self.dataset_type,
            current_version: 1,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VersionDraft {
    pub audio_file_id: FileId,
    pub version_number: u32,
    pub file_path: String,
    pub file_size: u64,
    pub original_format: SourceFormat,
    pub is_converted: bool,
    pub uploaded_by: String,
    pub notes: Option<String>,
    pub metadata: Option<AudioMetadata>,
}

impl VersionDraft {
    pub fn into_record(self, now: DateTime<Utc>) -> VersionRecord {
        VersionRecord {
            audio_file_id: self.audio_file_id,
            version_number: self.version_number,
            file_path: self.file_path,
            file_size: self.file_size,
            original_format: self.original_format,
            is_converted: self.is_converted,
            uploaded_by: self.uploaded_by,
            notes: self.notes,
            metadata: self.metadata,
            created_at: now,
        }
    }
}

/// Partial update of a file record. `None` leaves a field alone; for
/// nullable fields `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilePatch {
    pub filename: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<u64>,
    pub current_version: Option<u32>,
    pub metadata: Option<Option<AudioMetadata>>,
    pub emotion: Option<Option<Emotion>>,
    pub description: Option<Option<String>>,
    pub dataset_type: Option<Option<DatasetSplit>>,
}

impl FilePatch {
    pub fn is_empty(&self) -> bool {
        *self == FilePatch::default()
    }

    pub fn apply(&self, record: &mut FileRecord) {
        if let Some(v) = &self.filename {
            record.filename = v.clone();
        }
        if let Some(v) = &self.file_path {
            record.file_path = v.clone();
        }
        if let Some(v) = self.file_size {
            record.file_size = v;
        }
        if let Some(v) = self.current_version {
            record.current_version = v;
        }
        if let Some(v) = self.metadata {
            record.metadata = v;
        }
        if let Some(v) = self.emotion {
            record.emotion = v;
        }
        if let Some(v) = &self.description {
            record.description = v.clone();
        }
        if let Some(v) = self.dataset_type {
            record.dataset_type = v;
        }
    }
}

/// Trimmed text, or `None` when nothing is left.
pub fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
