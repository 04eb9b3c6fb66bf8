use super::surface::{Color, Surface};
use crate::waveform::WaveformEnvelope;

pub const DEFAULT_PLAYED: Color = Color::rgb(0x66, 0x7e, 0xea);
pub const DEFAULT_UNPLAYED: Color = Color::rgb(0xcc, 0xcc, 0xcc);

/// Fraction of half-height that an amplitude of 1.0 reaches.
const OVERLAY_SCALE: f32 = 0.6;
const PROGRESS_SCALE: f32 = 0.7;

const PLAYHEAD_WIDTH: f32 = 3.0;
const PLAYHEAD_CAP_RADIUS: f32 = 4.0;
const PLAYHEAD_CAP_INSET: f32 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Transparent, low-contrast shape meant to sit on top of other UI
    Overlay,
    /// Opaque progress bar with played/unplayed split and playhead
    Progress,
}

#[derive(Clone, Copy, Debug)]
pub struct ProgressStyle {
    pub played: Color,
    pub unplayed: Color,
}

impl Default for ProgressStyle {
    fn default() -> Self {
        Self {
            played: DEFAULT_PLAYED,
            unplayed: DEFAULT_UNPLAYED,
        }
    }
}

/// Horizontal playhead position for a progress fraction.
pub fn playhead_x(width: f32, progress: f64) -> f32 {
    width * progress.clamp(0.0, 1.0) as f32
}

/// Inverse of [`playhead_x`]: time under a pointer at `px` on a `width`-wide surface.
pub fn seek_time(px: f64, width: f64, duration: f64) -> f64 {
    if !(width > 0.0) || !(duration > 0.0) {
        return 0.0;
    }
    (px / width).clamp(0.0, 1.0) * duration
}

/// Number of leading buckets drawn in the played color.
pub fn progress_index(progress: f64, buckets: usize) -> usize {
    ((progress.clamp(0.0, 1.0) * buckets as f64).floor() as usize).min(buckets)
}

pub fn draw(surface: &mut Surface, envelope: &WaveformEnvelope, mode: RenderMode, progress: f64, style: &ProgressStyle) {
    match mode {
        RenderMode::Overlay => draw_overlay(surface, envelope, style.played),
        RenderMode::Progress => draw_progress(surface, envelope, progress, style),
    }
}

pub fn draw_overlay(surface: &mut Surface, envelope: &WaveformEnvelope, color: Color) {
    surface.clear();
    if envelope.is_empty() {
        return;
    }
    let outline = mirrored_outline(surface, envelope.values(), envelope.len(), OVERLAY_SCALE);
    surface.fill_polygon(&outline, color, 0.15);
    surface.stroke_polyline(&outline, true, 1.5, color, 0.4);
}

pub fn draw_progress(surface: &mut Surface, envelope: &WaveformEnvelope, progress: f64, style: &ProgressStyle) {
    let (width, height) = (surface.logical_width(), surface.logical_height());

    surface.clear();
    surface.fill_rect(0.0, 0.0, width, height, Color::WHITE, 1.0);

    if !envelope.is_empty() {
        let n = envelope.len();

        // Unplayed color always goes down first as the base layer
        let base = mirrored_outline(surface, envelope.values(), n, PROGRESS_SCALE);
        surface.fill_polygon(&base, style.unplayed, 0.25);
        surface.stroke_polyline(&base, true, 2.5, style.unplayed, 0.7);

        let played = progress_index(progress, n);
        if played > 0 {
            let head = mirrored_outline(surface, &envelope.values()[..played], n, PROGRESS_SCALE);
            surface.fill_polygon(&head, style.played, 0.6);
            surface.stroke_polyline(&head, true, 2.5, style.played, 1.0);
        }
    }

    let x = playhead_x(width, progress);
    surface.stroke_line((x, 0.0), (x, height), PLAYHEAD_WIDTH, Color::WHITE, 1.0);
    surface.stroke_line((x - 1.0, 0.0), (x - 1.0, height), 1.0, Color::BLACK, 0.4);
    surface.fill_circle(x, PLAYHEAD_CAP_INSET, PLAYHEAD_CAP_RADIUS, Color::WHITE, 1.0);
    surface.fill_circle(x, height - PLAYHEAD_CAP_INSET, PLAYHEAD_CAP_RADIUS, Color::WHITE, 1.0);
}

/// Upper edge left-to-right then lower edge right-to-left, mirrored about the
/// center line. `total` is the full envelope length so partial slices keep the
/// same horizontal step.
fn mirrored_outline(surface: &Surface, values: &[f32], total: usize, scale: f32) -> Vec<(f32, f32)> {
    let center_y = surface.logical_height() / 2.0;
    let step = surface.logical_width() / total as f32;
    let amplitude = |v: f32| v.max(0.0) * center_y * scale;

    let mut points = Vec::with_capacity(values.len() * 2);
    for (i, &v) in values.iter().enumerate() {
        points.push((i as f32 * step, center_y - amplitude(v)));
    }
    for (i, &v) in values.iter().enumerate().rev() {
        points.push((i as f32 * step, center_y + amplitude(v)));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: f32, n: usize) -> WaveformEnvelope {
        WaveformEnvelope::new(vec![value; n])
    }

    #[test]
    fn seek_inverts_playhead() {
        for width in [1.0f32, 37.0, 300.0, 1280.0] {
            for step in 0..=20 {
                let progress = step as f64 / 20.0;
                let x = playhead_x(width, progress) as f64;
                let back = seek_time(x, width as f64, 1.0);
                assert!((back - progress).abs() < 1e-6, "w={width} p={progress} got {back}");
            }
        }
    }

    #[test]
    fn seek_clamps_outside_the_surface() {
        assert_eq!(seek_time(-15.0, 200.0, 12.0), 0.0);
        assert_eq!(seek_time(250.0, 200.0, 12.0), 12.0);
        assert_eq!(seek_time(50.0, 200.0, 12.0), 3.0);
        assert_eq!(seek_time(50.0, 0.0, 12.0), 0.0);
        assert_eq!(seek_time(50.0, 200.0, 0.0), 0.0);
    }

    #[test]
    fn progress_index_is_floor() {
        assert_eq!(progress_index(0.0, 300), 0);
        assert_eq!(progress_index(0.5, 300), 150);
        assert_eq!(progress_index(0.999, 300), 299);
        assert_eq!(progress_index(1.0, 300), 300);
        assert_eq!(progress_index(7.0, 300), 300);
    }

    #[test]
    fn overlay_background_stays_transparent() {
        let mut s = Surface::new(120.0, 40.0, 1.0).unwrap();
        draw_overlay(&mut s, &flat(0.5, 60), DEFAULT_PLAYED);
        assert_eq!(s.pixel(60, 1)[3], 0);
        assert!(s.pixel(60, 20)[3] > 0);
    }

    #[test]
    fn progress_mode_splits_played_and_unplayed() {
        let mut s = Surface::new(200.0, 40.0, 1.0).unwrap();
        draw_progress(&mut s, &flat(0.5, 100), 0.5, &ProgressStyle::default());

        // Opaque white background away from the shape
        assert_eq!(s.pixel(150, 1), [255, 255, 255, 255]);

        let [r, _, b, a] = s.pixel(50, 20);
        assert_eq!(a, 255);
        assert!(b as i32 - r as i32 > 40, "played side should lean blue: {r} {b}");

        let [r, g, b, _] = s.pixel(150, 20);
        assert!((r as i32 - b as i32).abs() < 5 && (r as i32 - g as i32).abs() < 5);
        assert!(r < 250, "unplayed base layer must be visible");
    }

    #[test]
    fn zero_progress_still_shows_unplayed_shape() {
        let mut s = Surface::new(200.0, 40.0, 1.0).unwrap();
        draw_progress(&mut s, &flat(0.5, 100), 0.0, &ProgressStyle::default());
        let [r, _, b, _] = s.pixel(100, 20);
        assert!(r < 250 && (r as i32 - b as i32).abs() < 5);
    }

    #[test]
    fn playhead_is_drawn_at_progress() {
        let mut s = Surface::new(200.0, 40.0, 1.0).unwrap();
        draw_progress(&mut s, &flat(0.9, 100), 0.5, &ProgressStyle::default());
        assert_eq!(s.pixel(100, 20), [255, 255, 255, 255]);
    }

    #[test]
    fn rendering_respects_device_pixel_ratio() {
        let mut s = Surface::new(100.0, 20.0, 2.0).unwrap();
        draw_progress(&mut s, &flat(0.5, 50), 0.25, &ProgressStyle::default());
        assert_eq!(s.physical_size(), (200, 40));
        // Playhead at logical x=25 -> physical column 50
        assert_eq!(s.pixel(50, 20), [255, 255, 255, 255]);
    }
}
