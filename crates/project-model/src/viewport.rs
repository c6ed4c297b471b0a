//! Viewport and point types for camera framing.
//!
//! A viewport is the rectangle of the source recording, in source pixels,
//! that a camera frame shows scaled up to the full output raster.

use serde::{Deserialize, Serialize};

/// A rectangular region of the source recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge (source pixels, may be negative before clamping).
    pub x: f64,
    /// Top edge (source pixels, may be negative before clamping).
    pub y: f64,
    /// Width (source pixels).
    pub w: f64,
    /// Height (source pixels).
    pub h: f64,
}

impl Viewport {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Full-screen viewport of the given size.
    pub fn full(screen_w: u32, screen_h: u32) -> Self {
        Self::new(0.0, 0.0, screen_w as f64, screen_h as f64)
    }

    /// The region a camera centred at `(cx, cy)` with magnification `zoom`
    /// sees on a `screen_w x screen_h` output.
    pub fn for_frame(screen_w: u32, screen_h: u32, cx: f64, cy: f64, zoom: f64) -> Self {
        let zoom = if zoom > 0.0 { zoom } else { 1.0 };
        let w = screen_w as f64 / zoom;
        let h = screen_h as f64 / zoom;
        Self {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            w,
            h,
        }
    }

    /// The center point of this viewport.
    pub fn center(&self) -> Point2D {
        Point2D::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Map an output-raster pixel back into source space.
    ///
    /// Inverse of "scale by `zoom`, then translate by `-(x, y)`".
    pub fn source_point(&self, ox: f64, oy: f64, zoom: f64) -> Point2D {
        Point2D::new(self.x + ox / zoom, self.y + oy / zoom)
    }

    /// Map a source point into output-raster space.
    pub fn output_point(&self, sx: f64, sy: f64, zoom: f64) -> Point2D {
        Point2D::new((sx - self.x) * zoom, (sy - self.y) * zoom)
    }

    /// Shift (and if needed shrink) this viewport so it lies inside a
    /// `bound_w x bound_h` source.
    pub fn clamped_to(&self, bound_w: f64, bound_h: f64) -> Self {
        let w = self.w.min(bound_w).max(1.0);
        let h = self.h.min(bound_h).max(1.0);
        Self {
            x: self.x.clamp(0.0, (bound_w - w).max(0.0)),
            y: self.y.clamp(0.0, (bound_h - h).max(0.0)),
            w,
            h,
        }
    }
}

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation between two points.
    pub fn lerp(a: &Point2D, b: &Point2D, t: f64) -> Point2D {
        let t = t.clamp(0.0, 1.0);
        Point2D {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unzoomed_frame_is_full_screen() {
        let vp = Viewport::for_frame(1920, 1080, 960.0, 540.0, 1.0);
        assert_eq!(vp, Viewport::full(1920, 1080));
    }

    #[test]
    fn test_zoomed_frame_dimensions() {
        let vp = Viewport::for_frame(1920, 1080, 500.0, 400.0, 2.0);
        assert!((vp.w - 960.0).abs() < 1e-9);
        assert!((vp.h - 540.0).abs() < 1e-9);
        assert!((vp.x - 20.0).abs() < 1e-9);
        assert!((vp.y - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_zoom_treated_as_unzoomed() {
        let vp = Viewport::for_frame(800, 600, 400.0, 300.0, 0.0);
        assert_eq!(vp, Viewport::full(800, 600));
    }

    #[test]
    fn test_clamped_to_keeps_size_and_shifts_inside() {
        let vp = Viewport::new(-50.0, 900.0, 960.0, 540.0).clamped_to(1920.0, 1080.0);
        assert_eq!(vp.x, 0.0);
        assert_eq!(vp.y, 540.0);
        assert_eq!(vp.w, 960.0);
    }

    #[test]
    fn test_clamped_to_shrinks_oversized() {
        let vp = Viewport::for_frame(1920, 1080, 960.0, 540.0, 0.5).clamped_to(1920.0, 1080.0);
        assert_eq!(vp, Viewport::full(1920, 1080));
    }

    proptest! {
        #[test]
        fn prop_frame_viewport_centred_on_camera(
            cx in 0.0f64..4000.0,
            cy in 0.0f64..4000.0,
            zoom in 0.25f64..8.0,
        ) {
            let vp = Viewport::for_frame(1920, 1080, cx, cy, zoom);
            let c = vp.center();
            prop_assert!((c.x - cx).abs() < 1e-6);
            prop_assert!((c.y - cy).abs() < 1e-6);
            prop_assert!((vp.w * zoom - 1920.0).abs() < 1e-6);
        }

        #[test]
        fn prop_source_and_output_mapping_invert(
            cx in 0.0f64..1920.0,
            cy in 0.0f64..1080.0,
            zoom in 0.5f64..4.0,
            ox in 0.0f64..1920.0,
            oy in 0.0f64..1080.0,
        ) {
            let vp = Viewport::for_frame(1920, 1080, cx, cy, zoom);
            let s = vp.source_point(ox, oy, zoom);
            let o = vp.output_point(s.x, s.y, zoom);
            prop_assert!((o.x - ox).abs() < 1e-6);
            prop_assert!((o.y - oy).abs() < 1e-6);
        }

        #[test]
        fn prop_clamped_viewport_inside_bounds(
            x in -3000.0f64..3000.0,
            y in -3000.0f64..3000.0,
            w in 1.0f64..4000.0,
            h in 1.0f64..4000.0,
        ) {
            let vp = Viewport::new(x, y, w, h).clamped_to(1920.0, 1080.0);
            prop_assert!(vp.x >= 0.0 && vp.y >= 0.0);
            prop_assert!(vp.right() <= 1920.0 + 1e-9);
            prop_assert!(vp.bottom() <= 1080.0 + 1e-9);
        }
    }
}
