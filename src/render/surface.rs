use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

/// Non-premultiplied RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl FromStr for Color {
    type Err = String;

    /// Accepts `#rgb`, `#rrggbb` and `#rrggbbaa`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| format!("color '{}' must start with '#'", s))?;
        let nibble = |c: char| c.to_digit(16).map(|d| d as u8);
        let digits: Option<Vec<u8>> = hex.chars().map(nibble).collect();
        let d = digits.ok_or_else(|| format!("color '{}' has non-hex digits", s))?;

        match d.len() {
            3 => Ok(Color::rgb(d[0] * 17, d[1] * 17, d[2] * 17)),
            6 => Ok(Color::rgb(d[0] << 4 | d[1], d[2] << 4 | d[3], d[4] << 4 | d[5])),
            8 => Ok(Color::rgba(
                d[0] << 4 | d[1],
                d[2] << 4 | d[3],
                d[4] << 4 | d[5],
                d[6] << 4 | d[7],
            )),
            _ => Err(format!("color '{}' must have 3, 6 or 8 hex digits", s)),
        }
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Surface of {width}x{height} physical pixels cannot be allocated")]
    TooLarge { width: u32, height: u32 },
}

/// RGBA raster with a logical coordinate space.
///
/// Callers draw in logical units (layout size); the surface owns
/// `ceil(logical * dpr)` physical pixels and every draw call goes through the
/// same scale transform. Compositing is anti-aliased source-over.
pub struct Surface {
    logical_width: f32,
    logical_height: f32,
    dpr: f32,
    pixmap: Pixmap,
}

impl Surface {
    pub fn new(logical_width: f32, logical_height: f32, device_pixel_ratio: f32) -> Result<Self, SurfaceError> {
        let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        let logical_width = logical_width.max(0.0);
        let logical_height = logical_height.max(0.0);
        let width = ((logical_width * dpr).ceil() as u32).max(1);
        let height = ((logical_height * dpr).ceil() as u32).max(1);
        let pixmap = Pixmap::new(width, height).ok_or(SurfaceError::TooLarge { width, height })?;
        Ok(Self {
            logical_width,
            logical_height,
            dpr,
            pixmap,
        })
    }

    pub fn logical_width(&self) -> f32 {
        self.logical_width
    }

    pub fn logical_height(&self) -> f32 {
        self.logical_height
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    pub fn physical_size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    /// Physical pixel at (x, y), non-premultiplied. Out of range reads as transparent.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixmap
            .pixel(x, y)
            .map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .unwrap_or([0; 4])
    }

    /// Reset every pixel to fully transparent.
    pub fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color, alpha: f32) {
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            let path = PathBuilder::from_rect(rect);
            self.fill(&path, color, alpha);
        }
    }

    /// Even-odd fill of a closed polygon.
    pub fn fill_polygon(&mut self, points: &[(f32, f32)], color: Color, alpha: f32) {
        if points.len() < 3 {
            return;
        }
        if let Some(path) = polyline_path(points, true) {
            self.fill(&path, color, alpha);
        }
    }

    /// Stroke connected segments with round joins. The stroke is one
    /// outline, so overlapping segments are blended once.
    pub fn stroke_polyline(&mut self, points: &[(f32, f32)], closed: bool, width: f32, color: Color, alpha: f32) {
        let Some(path) = polyline_path(points, closed && points.len() > 2) else {
            return;
        };
        let Some(paint) = paint(color, alpha) else {
            return;
        };
        let stroke = Stroke {
            width: width.max(0.0),
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        let transform = self.transform();
        self.pixmap.stroke_path(&path, &paint, &stroke, transform, None);
    }

    pub fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Color, alpha: f32) {
        let Some(path) = polyline_path(&[from, to], false) else {
            return;
        };
        let Some(paint) = paint(color, alpha) else {
            return;
        };
        // Butt caps so a full-height line ends exactly at the surface edges
        let stroke = Stroke {
            width: width.max(0.0),
            ..Stroke::default()
        };
        let transform = self.transform();
        self.pixmap.stroke_path(&path, &paint, &stroke, transform, None);
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color, alpha: f32) {
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            self.fill(&path, color, alpha);
        }
    }

    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        let (width, height) = self.physical_size();
        let data: Vec<u8> = self
            .pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();
        image::save_buffer(path, &data, width, height, image::ColorType::Rgba8)
    }

    fn transform(&self) -> Transform {
        Transform::from_scale(self.dpr, self.dpr)
    }

    fn fill(&mut self, path: &tiny_skia::Path, color: Color, alpha: f32) {
        if let Some(paint) = paint(color, alpha) {
            let transform = self.transform();
            self.pixmap.fill_path(path, &paint, FillRule::EvenOdd, transform, None);
        }
    }
}

/// Solid paint with the color's own alpha scaled by a global alpha; `None`
/// when nothing would be drawn.
fn paint(color: Color, alpha: f32) -> Option<Paint<'static>> {
    let a = (color.a as f32 * alpha.clamp(0.0, 1.0)).round() as u8;
    if a == 0 {
        return None;
    }
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, a);
    paint.anti_alias = true;
    Some(paint)
}

/// A single point becomes a zero-length segment so round caps still mark it.
fn polyline_path(points: &[(f32, f32)], closed: bool) -> Option<tiny_skia::Path> {
    let (&(x0, y0), rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(x0, y0);
    if rest.is_empty() {
        pb.line_to(x0, y0);
    }
    for &(x, y) in rest {
        pb.line_to(x, y);
    }
    if closed {
        pb.close();
    }
    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!("#ccc".parse::<Color>().unwrap(), Color::rgb(204, 204, 204));
        assert_eq!("#667eea".parse::<Color>().unwrap(), Color::rgb(0x66, 0x7e, 0xea));
        assert_eq!("#00000066".parse::<Color>().unwrap(), Color::rgba(0, 0, 0, 0x66));
        assert!("667eea".parse::<Color>().is_err());
        assert!("#12".parse::<Color>().is_err());
        assert!("#zzzzzz".parse::<Color>().is_err());
    }

    #[test]
    fn physical_size_follows_device_pixel_ratio() {
        let s = Surface::new(100.0, 40.0, 2.0).unwrap();
        assert_eq!(s.physical_size(), (200, 80));
        assert_eq!(s.logical_width(), 100.0);

        let s = Surface::new(10.5, 3.0, 1.5).unwrap();
        assert_eq!(s.physical_size(), (16, 5));

        let s = Surface::new(10.0, 10.0, 0.0).unwrap();
        assert_eq!(s.device_pixel_ratio(), 1.0);
    }

    #[test]
    fn fill_rect_uses_logical_coordinates() {
        let mut s = Surface::new(10.0, 10.0, 2.0).unwrap();
        s.fill_rect(0.0, 0.0, 5.0, 10.0, Color::WHITE, 1.0);
        assert_eq!(s.pixel(9, 5), [255, 255, 255, 255]);
        assert_eq!(s.pixel(10, 5), [0, 0, 0, 0]);
    }

    #[test]
    fn alpha_blends_over_opaque_background() {
        let mut s = Surface::new(4.0, 4.0, 1.0).unwrap();
        s.fill_rect(0.0, 0.0, 4.0, 4.0, Color::WHITE, 1.0);
        s.fill_rect(0.0, 0.0, 4.0, 4.0, Color::BLACK, 0.5);
        let [r, g, b, a] = s.pixel(1, 1);
        assert_eq!(a, 255);
        assert!((r as i32 - 127).abs() <= 2 && r == g && g == b);
    }

    #[test]
    fn polygon_fill_covers_interior_only() {
        let mut s = Surface::new(20.0, 20.0, 1.0).unwrap();
        s.fill_polygon(&[(5.0, 5.0), (15.0, 5.0), (15.0, 15.0), (5.0, 15.0)], Color::BLACK, 1.0);
        assert_eq!(s.pixel(10, 10)[3], 255);
        assert_eq!(s.pixel(2, 2)[3], 0);
        assert_eq!(s.pixel(17, 10)[3], 0);
    }

    #[test]
    fn overlapping_stroke_segments_blend_once() {
        let mut s = Surface::new(20.0, 20.0, 1.0).unwrap();
        s.stroke_polyline(&[(2.0, 10.0), (10.0, 10.0), (18.0, 10.0)], false, 2.0, Color::BLACK, 0.5);
        assert_eq!(s.pixel(10, 9)[3], s.pixel(5, 9)[3]);
    }

    #[test]
    fn circle_is_round() {
        let mut s = Surface::new(20.0, 20.0, 1.0).unwrap();
        s.fill_circle(10.0, 10.0, 4.0, Color::WHITE, 1.0);
        assert_eq!(s.pixel(10, 10)[3], 255);
        assert_eq!(s.pixel(12, 10)[3], 255);
        assert_eq!(s.pixel(13, 13)[3], 0);
        assert_eq!(s.pixel(15, 10)[3], 0);
    }

    #[test]
    fn polygon_fill_is_even_odd() {
        // Outer square with the inner square traced again: the hole stays empty
        let mut s = Surface::new(20.0, 20.0, 1.0).unwrap();
        let ring = [
            (2.0, 2.0), (18.0, 2.0), (18.0, 18.0), (2.0, 18.0), (2.0, 2.0),
            (6.0, 6.0), (14.0, 6.0), (14.0, 14.0), (6.0, 14.0), (6.0, 6.0),
        ];
        s.fill_polygon(&ring, Color::BLACK, 1.0);
        assert_eq!(s.pixel(10, 10)[3], 0);
        assert_eq!(s.pixel(3, 10)[3], 255);
    }

    #[test]
    fn out_of_range_pixels_read_transparent() {
        let s = Surface::new(4.0, 4.0, 1.0).unwrap();
        assert_eq!(s.pixel(40, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.png");
        let mut s = Surface::new(8.0, 4.0, 1.0).unwrap();
        s.fill_rect(0.0, 0.0, 8.0, 4.0, Color::WHITE, 1.0);
        s.fill_rect(0.0, 0.0, 4.0, 4.0, Color::rgb(0x66, 0x7e, 0xea), 1.0);
        s.save_png(&path).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.get_pixel(1, 1).0, [0x66, 0x7e, 0xea, 255]);
        assert_eq!(img.get_pixel(6, 1).0, [255, 255, 255, 255]);
    }
}
