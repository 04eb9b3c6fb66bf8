use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer as InterleavedBuffer, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::SampleBuffer;
use super::error::DecodeError;
use crate::encode::wav::pcm16_to_f32;

/// Read and decode an audio file from disk, using its extension as a probe hint.
pub fn decode_file(path: &Path) -> Result<SampleBuffer, DecodeError> {
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_bytes(bytes, ext)
}

/// Decode an in-memory audio file into per-channel float planes.
///
/// The sample rate is passed through untouched; no resampling or down-mixing
/// happens here.
pub fn decode_bytes(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<SampleBuffer, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let byte_len = bytes.len();

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut planes: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::Malformed(e.to_string())),
        };

        let spec = *decoded.spec();
        if sample_rate.is_none() {
            sample_rate = Some(spec.rate);
        }

        let channels = spec.channels.count();
        if planes.is_empty() {
            planes = vec![Vec::new(); channels];
        } else if planes.len() != channels {
            return Err(DecodeError::InvalidLayout(format!(
                "channel count changed mid-stream ({} -> {})",
                planes.len(),
                channels
            )));
        }

        append_planes(&mut planes, decoded);
    }

    let sample_rate = sample_rate.ok_or(DecodeError::MissingSampleRate)?;
    if planes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let buffer = SampleBuffer::new(planes, sample_rate)?;

    log::info!(
        "Decoded audio: {} bytes -> {} frames x {} ch, {}Hz, {:.2}s",
        byte_len,
        buffer.frame_count(),
        buffer.channel_count(),
        sample_rate,
        buffer.duration_seconds()
    );

    Ok(buffer)
}

fn append_planes(planes: &mut [Vec<f32>], decoded: AudioBufferRef<'_>) {
    match decoded {
        // 16-bit PCM is mapped back with the inverse of the encoder's scaling so
        // that canonical files round-trip within one quantization step.
        AudioBufferRef::S16(buf) => {
            for (ch, plane) in planes.iter_mut().enumerate() {
                plane.extend(buf.chan(ch).iter().map(|&s| pcm16_to_f32(s)));
            }
        }
        other => {
            let spec = *other.spec();
            let frames = other.frames();
            let mut interleaved = InterleavedBuffer::<f32>::new(frames as u64, spec);
            interleaved.copy_interleaved_ref(other);

            let channels = planes.len();
            for frame in interleaved.samples().chunks(channels) {
                for (plane, &sample) in planes.iter_mut().zip(frame) {
                    plane.push(sample);
                }
            }
        }
    }
}
