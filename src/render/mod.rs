pub mod surface;
pub mod waveform;
