//! Drawing surface shared by both render modes.
//!
//! A [`Surface`] is a plain RGBA8 pixel grid. The 2D context and the scene
//! renderer both paint into it through a [`CanvasHandle`], which is what the
//! generated code receives as `canvas`.

mod color;
mod context;

use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

pub(crate) use color::hsl_to_rgb;
pub use color::{parse_css_color, Rgba};
pub use context::{Context2d, Context2dHandle, DrawCommand};

/// RGBA pixel surface that mirrors a HTML canvas element.
#[derive(Clone)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resizes the pixel grid. Like a canvas element, resizing clears it.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize * 4, 0);
    }

    /// Returns the raw RGBA pixel buffer.
    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    /// Clear the surface to transparent black.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Fill the whole surface with an opaque colour.
    pub fn fill(&mut self, color: Rgba) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color.to_bytes());
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    /// Overwrites a pixel without blending. Out-of-bounds writes are dropped.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.pixels[i..i + 4].copy_from_slice(&rgba);
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Source-over blend of a single pixel. Out-of-bounds writes are dropped.
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let alpha = color.a.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let i = self.index(x as u32, y as u32);
        let dst = &mut self.pixels[i..i + 4];
        let dst_a = dst[3] as f32 / 255.0;
        let inv = 1.0 - alpha;
        dst[0] = (color.r as f32 * alpha + dst[0] as f32 * inv).round() as u8;
        dst[1] = (color.g as f32 * alpha + dst[1] as f32 * inv).round() as u8;
        dst[2] = (color.b as f32 * alpha + dst[2] as f32 * inv).round() as u8;
        dst[3] = ((alpha + dst_a * inv) * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    /// Clips a floating point rectangle to integer pixel bounds.
    fn clip_rect(&self, x: f64, y: f64, w: f64, h: f64) -> Option<(u32, u32, u32, u32)> {
        let (x0, x1) = if w < 0.0 { (x + w, x) } else { (x, x + w) };
        let (y0, y1) = if h < 0.0 { (y + h, y) } else { (y, y + h) };
        let x0 = x0.round().max(0.0).min(self.width as f64) as u32;
        let x1 = x1.round().max(0.0).min(self.width as f64) as u32;
        let y0 = y0.round().max(0.0).min(self.height as f64) as u32;
        let y1 = y1.round().max(0.0).min(self.height as f64) as u32;
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Rgba) {
        if let Some((x0, y0, x1, y1)) = self.clip_rect(x, y, w, h) {
            for py in y0..y1 {
                for px in x0..x1 {
                    self.blend_pixel(px as i64, py as i64, color);
                }
            }
        }
    }

    /// Resets a rectangle to transparent black.
    pub fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        if let Some((x0, y0, x1, y1)) = self.clip_rect(x, y, w, h) {
            for py in y0..y1 {
                let start = self.index(x0, py);
                let end = self.index(x1 - 1, py) + 4;
                self.pixels[start..end].fill(0);
            }
        }
    }

    /// Bresenham line stamped with a square brush of `width` pixels.
    ///
    /// The segment is clipped to the surface (grown by the brush) first, and
    /// the brush never exceeds the surface, so work stays bounded by the
    /// surface size whatever the coordinates.
    pub fn draw_line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, color: Rgba) {
        if !(from.0.is_finite() && from.1.is_finite() && to.0.is_finite() && to.1.is_finite()) {
            return;
        }
        let max_brush = self.width.max(self.height).max(1) as f64;
        let brush = if width.is_finite() { width.clamp(1.0, max_brush) } else { max_brush };
        let brush = brush.round() as i64;
        let offset = brush / 2;

        let margin = brush as f64;
        let bounds = (
            -margin,
            -margin,
            self.width as f64 + margin,
            self.height as f64 + margin,
        );
        let Some((from, to)) = clip_segment(from, to, bounds) else {
            return;
        };

        let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
        let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
        let dx = x0.abs_diff(x1) as i64;
        let dy = -(y0.abs_diff(y1) as i64);
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            for by in 0..brush {
                for bx in 0..brush {
                    self.blend_pixel(x0 + bx - offset, y0 + by - offset, color);
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Even-odd scanline fill of a closed polygon.
    pub fn fill_polygon(&mut self, points: &[(f64, f64)], color: Rgba) {
        if points.len() < 3 {
            return;
        }
        let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        if !(min_y.is_finite() && max_y.is_finite()) {
            return;
        }
        let y_start = min_y.floor().max(0.0) as i64;
        let y_end = max_y.ceil().min(self.height as f64) as i64;
        let mut crossings = Vec::new();
        for py in y_start..y_end {
            let scan = py as f64 + 0.5;
            crossings.clear();
            for i in 0..points.len() {
                let (ax, ay) = points[i];
                let (bx, by) = points[(i + 1) % points.len()];
                if (ay <= scan && by > scan) || (by <= scan && ay > scan) {
                    crossings.push(ax + (scan - ay) / (by - ay) * (bx - ax));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));
            for pair in crossings.chunks_exact(2) {
                let x_start = pair[0].round().max(0.0) as i64;
                let x_end = pair[1].round().min(self.width as f64) as i64;
                for px in x_start..x_end {
                    self.blend_pixel(px, py, color);
                }
            }
        }
    }
}

/// Liang-Barsky clip of `from..to` against `(min_x, min_y, max_x, max_y)`.
fn clip_segment(
    from: (f64, f64),
    to: (f64, f64),
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    if !(dx.is_finite() && dy.is_finite()) {
        // Endpoints at opposite extremes of f64: split at the midpoint.
        let mid = (from.0 / 2.0 + to.0 / 2.0, from.1 / 2.0 + to.1 / 2.0);
        let head = clip_segment(from, mid, (min_x, min_y, max_x, max_y));
        let tail = clip_segment(mid, to, (min_x, min_y, max_x, max_y));
        return match (head, tail) {
            (Some((a, _)), Some((_, b))) => Some((a, b)),
            (Some(part), None) | (None, Some(part)) => Some(part),
            (None, None) => None,
        };
    }

    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let edges = [
        (-dx, from.0 - min_x),
        (dx, max_x - from.0),
        (-dy, from.1 - min_y),
        (dy, max_y - from.1),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        (from.0 + t0 * dx, from.1 + t0 * dy),
        (from.0 + t1 * dx, from.1 + t1 * dy),
    ))
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Shared handle to a [`Surface`]. This is the value scripts see as `canvas`.
#[derive(Clone, Debug)]
pub struct CanvasHandle {
    surface: Rc<RefCell<Surface>>,
}

impl CanvasHandle {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: Rc::new(RefCell::new(Surface::new(width, height))),
        }
    }

    pub fn width(&self) -> u32 {
        self.surface.borrow().width()
    }

    pub fn height(&self) -> u32 {
        self.surface.borrow().height()
    }

    pub fn size(&self) -> (u32, u32) {
        let surface = self.surface.borrow();
        (surface.width(), surface.height())
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.surface.borrow_mut().set_size(width, height);
    }

    pub fn surface(&self) -> Ref<'_, Surface> {
        self.surface.borrow()
    }

    pub fn surface_mut(&self) -> RefMut<'_, Surface> {
        self.surface.borrow_mut()
    }

    /// True when both handles point at the same surface.
    pub fn same_surface(&self, other: &CanvasHandle) -> bool {
        Rc::ptr_eq(&self.surface, &other.surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = Rgba::rgb(255, 0, 0);

    #[test]
    fn fill_rect_is_clipped_to_the_surface() {
        let mut surface = Surface::new(4, 4);
        surface.fill_rect(2.0, 2.0, 10.0, 10.0, RED);
        assert_eq!(surface.pixel(3, 3), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn negative_extent_rectangles_are_normalised() {
        let mut surface = Surface::new(4, 4);
        surface.fill_rect(4.0, 4.0, -2.0, -2.0, RED);
        assert_eq!(surface.pixel(2, 2), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn clear_rect_resets_pixels() {
        let mut surface = Surface::new(4, 4);
        surface.fill(RED);
        surface.clear_rect(0.0, 0.0, 2.0, 4.0);
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(surface.pixel(3, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn half_alpha_blends_over_existing_pixels() {
        let mut surface = Surface::new(1, 1);
        surface.fill(Rgba::rgb(0, 0, 0));
        surface.blend_pixel(0, 0, Rgba::new(255, 255, 255, 0.5));
        let [r, _, _, a] = surface.pixel(0, 0).unwrap();
        assert!((127..=128).contains(&r));
        assert_eq!(a, 255);
    }

    #[test]
    fn polygon_fill_covers_interior() {
        let mut surface = Surface::new(10, 10);
        surface.fill_polygon(&[(1.0, 1.0), (9.0, 1.0), (9.0, 9.0), (1.0, 9.0)], RED);
        assert_eq!(surface.pixel(5, 5), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn line_reaches_both_endpoints() {
        let mut surface = Surface::new(8, 8);
        surface.draw_line((0.0, 0.0), (7.0, 7.0), 1.0, RED);
        assert_eq!(surface.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(7, 7), Some([255, 0, 0, 255]));
    }

    #[test]
    fn line_with_extreme_endpoints_is_clipped() {
        let mut surface = Surface::new(16, 16);
        surface.draw_line((-1e300, 4.0), (1e300, 4.0), 1.0, RED);
        assert_eq!(surface.pixel(0, 4), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(15, 4), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(0, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn long_line_off_the_surface_finishes_quickly() {
        let mut surface = Surface::new(64, 64);
        let started = std::time::Instant::now();
        surface.draw_line((0.0, 0.0), (1e10, 1.0), 1.0, RED);
        surface.draw_line((1e12, 1e12), (2e12, 3e12), 1.0, RED);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(surface.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(63, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn huge_brush_is_capped_to_the_surface() {
        let mut surface = Surface::new(8, 8);
        let started = std::time::Instant::now();
        surface.draw_line((0.0, 0.0), (7.0, 7.0), 1e6, RED);
        surface.draw_line((0.0, 0.0), (7.0, 0.0), f64::INFINITY, RED);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(surface.pixel(0, 7), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(7, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn resizing_reallocates_and_clears() {
        let handle = CanvasHandle::new(2, 2);
        handle.surface_mut().fill(RED);
        handle.set_size(3, 5);
        assert_eq!(handle.size(), (3, 5));
        assert_eq!(handle.surface().as_rgba().len(), 3 * 5 * 4);
        assert!(handle.surface().as_rgba().iter().all(|b| *b == 0));
    }
}
