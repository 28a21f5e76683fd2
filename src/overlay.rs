// src/overlay.rs - Draws detected landmarks and their connections over a frame
use image::{imageops, DynamicImage, Rgba, RgbaImage};

use crate::pose::{BodyLandmark, Landmark};

/// Landmarks and connection endpoints scored below this are not drawn.
pub const OVERLAY_VISIBILITY_THRESHOLD: f32 = 0.3;

/// Anatomical connections of the 33-point body schema.
pub const POSE_CONNECTIONS: [(BodyLandmark, BodyLandmark); 35] = [
    // head
    (BodyLandmark::Nose, BodyLandmark::LeftEyeInner),
    (BodyLandmark::LeftEyeInner, BodyLandmark::LeftEye),
    (BodyLandmark::LeftEye, BodyLandmark::LeftEyeOuter),
    (BodyLandmark::LeftEyeOuter, BodyLandmark::LeftEar),
    (BodyLandmark::Nose, BodyLandmark::RightEyeInner),
    (BodyLandmark::RightEyeInner, BodyLandmark::RightEye),
    (BodyLandmark::RightEye, BodyLandmark::RightEyeOuter),
    (BodyLandmark::RightEyeOuter, BodyLandmark::RightEar),
    (BodyLandmark::MouthLeft, BodyLandmark::MouthRight),
    // arms
    (BodyLandmark::LeftShoulder, BodyLandmark::RightShoulder),
    (BodyLandmark::LeftShoulder, BodyLandmark::LeftElbow),
    (BodyLandmark::LeftElbow, BodyLandmark::LeftWrist),
    (BodyLandmark::LeftWrist, BodyLandmark::LeftPinky),
    (BodyLandmark::LeftWrist, BodyLandmark::LeftIndex),
    (BodyLandmark::LeftWrist, BodyLandmark::LeftThumb),
    (BodyLandmark::LeftPinky, BodyLandmark::LeftIndex),
    (BodyLandmark::RightShoulder, BodyLandmark::RightElbow),
    (BodyLandmark::RightElbow, BodyLandmark::RightWrist),
    (BodyLandmark::RightWrist, BodyLandmark::RightPinky),
    (BodyLandmark::RightWrist, BodyLandmark::RightIndex),
    (BodyLandmark::RightWrist, BodyLandmark::RightThumb),
    (BodyLandmark::RightPinky, BodyLandmark::RightIndex),
    // torso
    (BodyLandmark::LeftShoulder, BodyLandmark::LeftHip),
    (BodyLandmark::RightShoulder, BodyLandmark::RightHip),
    (BodyLandmark::LeftHip, BodyLandmark::RightHip),
    // legs
    (BodyLandmark::LeftHip, BodyLandmark::LeftKnee),
    (BodyLandmark::LeftKnee, BodyLandmark::LeftAnkle),
    (BodyLandmark::LeftAnkle, BodyLandmark::LeftHeel),
    (BodyLandmark::LeftHeel, BodyLandmark::LeftFootIndex),
    (BodyLandmark::LeftAnkle, BodyLandmark::LeftFootIndex),
    (BodyLandmark::RightHip, BodyLandmark::RightKnee),
    (BodyLandmark::RightKnee, BodyLandmark::RightAnkle),
    (BodyLandmark::RightAnkle, BodyLandmark::RightHeel),
    (BodyLandmark::RightHeel, BodyLandmark::RightFootIndex),
    (BodyLandmark::RightAnkle, BodyLandmark::RightFootIndex),
];

/// Software renderer painting skeleton overlays into a caller-owned RGBA
/// surface. Landmark coordinates are normalized; pixels land wherever the
/// surface dimensions put them, clipped at the edges.
pub struct OverlayRenderer {
    pub line_color: Rgba<u8>,
    pub point_color: Rgba<u8>,
    pub point_radius: i32,
    pub visibility_threshold: f32,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self {
            line_color: Rgba([255, 220, 0, 255]),
            point_color: Rgba([0, 255, 70, 255]),
            point_radius: 4,
            visibility_threshold: OVERLAY_VISIBILITY_THRESHOLD,
        }
    }
}

impl OverlayRenderer {
    /// Redraws `frame` as the surface background, scaled to the surface
    /// dimensions, then paints connections and points for the landmark set
    /// if one is present.
    pub fn render(&self, surface: &mut RgbaImage, frame: &DynamicImage, landmarks: Option<&[Landmark]>) {
        let background = frame
            .resize_exact(surface.width(), surface.height(), imageops::FilterType::Triangle)
            .to_rgba8();
        imageops::replace(surface, &background, 0, 0);
        if let Some(landmarks) = landmarks {
            self.draw_landmarks(surface, landmarks);
        }
    }

    fn draw_landmarks(&self, surface: &mut RgbaImage, landmarks: &[Landmark]) {
        let width = surface.width();
        let height = surface.height();

        // Connections first so points sit on top of them.
        for (from, to) in POSE_CONNECTIONS.iter() {
            let (a, b) = match (landmarks.get(*from as usize), landmarks.get(*to as usize)) {
                (Some(a), Some(b)) => (a, b),
                _ => continue,
            };
            if !a.is_visible(self.visibility_threshold) || !b.is_visible(self.visibility_threshold) {
                continue;
            }
            let (x0, y0) = to_pixel(a, width, height);
            let (x1, y1) = to_pixel(b, width, height);
            draw_line(surface, x0, y0, x1, y1, self.line_color);
        }

        for landmark in landmarks {
            if landmark.is_visible(self.visibility_threshold) {
                let (x, y) = to_pixel(landmark, width, height);
                fill_circle(surface, x, y, self.point_radius, self.point_color);
            }
        }
    }
}

fn to_pixel(landmark: &Landmark, width: u32, height: u32) -> (i32, i32) {
    (
        (landmark.x * width as f32) as i32,
        (landmark.y * height as f32) as i32,
    )
}

/// Bresenham line, clipped pixel by pixel.
fn draw_line(surface: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut x = x0;
    let mut y = y0;
    loop {
        set_pixel(surface, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn fill_circle(surface: &mut RgbaImage, cx: i32, cy: i32, radius: i32, color: Rgba<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                set_pixel(surface, cx + dx, cy + dy, color);
            }
        }
    }
}

fn set_pixel(surface: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < surface.width() && (y as u32) < surface.height() {
        surface.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::BodyLandmark;

    const BACKGROUND: Rgba<u8> = Rgba([10, 10, 10, 255]);

    fn backdrop() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 100, BACKGROUND))
    }

    fn hidden_set() -> Vec<Landmark> {
        (0..BodyLandmark::COUNT)
            .map(|_| Landmark::new(0.5, 0.5, 0.0, None))
            .collect()
    }

    #[test]
    fn test_render_without_landmarks_is_background_only() {
        let mut surface = RgbaImage::new(100, 100);
        OverlayRenderer::default().render(&mut surface, &backdrop(), None);
        assert_eq!(surface.get_pixel(50, 50), &BACKGROUND);
        assert_eq!(surface.get_pixel(0, 99), &BACKGROUND);
    }

    #[test]
    fn test_visible_connection_is_drawn() {
        let renderer = OverlayRenderer::default();
        let mut surface = RgbaImage::new(100, 100);
        let mut landmarks = hidden_set();
        // A horizontal shoulder line across the middle of the surface.
        landmarks[BodyLandmark::LeftShoulder as usize] = Landmark::new(0.8, 0.5, 0.0, Some(0.9));
        landmarks[BodyLandmark::RightShoulder as usize] = Landmark::new(0.2, 0.5, 0.0, Some(0.9));
        renderer.render(&mut surface, &backdrop(), Some(&landmarks));
        assert_eq!(surface.get_pixel(50, 50), &renderer.line_color);
        // Endpoints are covered by joint circles.
        assert_eq!(surface.get_pixel(80, 50), &renderer.point_color);
        assert_eq!(surface.get_pixel(20, 50), &renderer.point_color);
    }

    #[test]
    fn test_low_visibility_is_skipped() {
        let renderer = OverlayRenderer::default();
        let mut surface = RgbaImage::new(100, 100);
        let mut landmarks = hidden_set();
        landmarks[BodyLandmark::LeftShoulder as usize] = Landmark::new(0.8, 0.5, 0.0, Some(0.1));
        landmarks[BodyLandmark::RightShoulder as usize] = Landmark::new(0.2, 0.5, 0.0, Some(0.9));
        renderer.render(&mut surface, &backdrop(), Some(&landmarks));
        // The connection needs both ends; only the scored joint is painted.
        assert_eq!(surface.get_pixel(50, 50), &BACKGROUND);
        assert_eq!(surface.get_pixel(80, 50), &BACKGROUND);
        assert_eq!(surface.get_pixel(20, 50), &renderer.point_color);
    }

    #[test]
    fn test_out_of_frame_coordinates_are_clipped() {
        let renderer = OverlayRenderer::default();
        let mut surface = RgbaImage::new(100, 100);
        let mut landmarks = hidden_set();
        landmarks[BodyLandmark::LeftShoulder as usize] = Landmark::new(1.5, -0.5, 0.0, Some(0.9));
        landmarks[BodyLandmark::LeftElbow as usize] = Landmark::new(0.5, 0.5, 0.0, Some(0.9));
        // Must not panic; the in-frame endpoint still gets its circle.
        renderer.render(&mut surface, &backdrop(), Some(&landmarks));
        assert_eq!(surface.get_pixel(50, 50), &renderer.point_color);
    }

    #[test]
    fn test_short_landmark_set_draws_what_it_can() {
        let renderer = OverlayRenderer::default();
        let mut surface = RgbaImage::new(100, 100);
        let landmarks = vec![Landmark::new(0.5, 0.5, 0.0, Some(1.0)); 5];
        renderer.render(&mut surface, &backdrop(), Some(&landmarks));
        assert_eq!(surface.get_pixel(50, 50), &renderer.point_color);
    }

    #[test]
    fn test_connection_table_is_in_schema_range() {
        for (from, to) in POSE_CONNECTIONS.iter() {
            assert!((*from as usize) < BodyLandmark::COUNT);
            assert!((*to as usize) < BodyLandmark::COUNT);
            assert_ne!(*from as usize, *to as usize);
        }
    }
}
