use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::decode::decode_bytes;
use super::error::{DecodeError, EncodeError};
use crate::encode::wav::encode_wav;

/// Formats accepted at upload time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Wav,
    Mp3,
}

impl SourceFormat {
    /// Detect from a file name's extension, case-insensitively.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "wav" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Unsupported file format '{0}': only .mp3 and .wav are accepted")]
    UnsupportedFormat(String),

    #[error("Could not convert MP3 to WAV: {0}")]
    Decode(#[from] DecodeError),

    #[error("Could not write WAV: {0}")]
    Encode(#[from] EncodeError),
}

/// A file ready to be stored: always WAV bytes.
#[derive(Clone, Debug)]
pub struct ConvertedAudio {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub original_format: SourceFormat,
    pub is_converted: bool,
    pub original_size: u64,
}

/// Turn an uploaded file into canonical WAV bytes.
///
/// MP3 input is decoded and re-encoded; WAV input is passed through as-is.
/// A decode failure here aborts the upload.
pub fn to_canonical_wav(file_name: &str, bytes: Vec<u8>) -> Result<ConvertedAudio, ConvertError> {
    let format = SourceFormat::from_file_name(file_name)
        .ok_or_else(|| ConvertError::UnsupportedFormat(file_name.to_string()))?;
    let original_size = bytes.len() as u64;

    match format {
        SourceFormat::Wav => Ok(ConvertedAudio {
            file_name: file_name.to_string(),
            bytes,
            original_format: format,
            is_converted: false,
            original_size,
        }),
        SourceFormat::Mp3 => {
            log::info!("Converting {} to WAV...", file_name);
            let buffer = decode_bytes(bytes, Some("mp3"))?;
            let wav = encode_wav(&buffer)?;
            Ok(ConvertedAudio {
                file_name: with_wav_extension(file_name),
                bytes: wav,
                original_format: format,
                is_converted: true,
                original_size,
            })
        }
    }
}

/// File name without its final extension.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

pub fn with_wav_extension(name: &str) -> String {
    format!("{}.wav", file_stem(name))
}
