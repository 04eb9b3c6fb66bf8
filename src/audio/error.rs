use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning encoded bytes into a [`SampleBuffer`](super::buffer::SampleBuffer).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Zero bytes, or a stream that produced no frames
    #[error("No audio data to decode")]
    Empty,

    /// The bytes are not a container/codec we can parse
    #[error("Unsupported or unrecognized audio data: {0}")]
    Unsupported(String),

    #[error("No decodable audio track found")]
    NoTrack,

    #[error("Audio track does not declare a sample rate")]
    MissingSampleRate,

    /// The container was recognized but the stream is corrupt
    #[error("Malformed audio stream: {0}")]
    Malformed(String),

    /// Channel planes are inconsistent (differing lengths, no channels, zero rate)
    #[error("Invalid sample layout: {0}")]
    InvalidLayout(String),

    #[error("Failed to read audio file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while writing the canonical WAV container.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Too many channels for a WAV header: {0} (max 65535)")]
    TooManyChannels(usize),

    #[error("PCM payload of {0} bytes does not fit a 32-bit RIFF size field")]
    DataTooLarge(u64),
}
