use std::time::Duration;
use std::time::Instant;

use egui::Pos2;
use egui::Rect;
use egui::Vec2;

use super::Orientation;

pub const DEFAULT_HFOV: f64 = 100.0;
pub const MIN_HFOV: f64 = 30.0;
pub const MAX_HFOV: f64 = 120.0;

/// Wraps a yaw angle into `(-180, 180]`.
pub fn normalize_yaw(yaw: f64) -> f64 {
    let wrapped = (yaw + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

pub fn clamp_pitch(pitch: f64) -> f64 {
    pitch.clamp(-90.0, 90.0)
}

/// Camera over an equirectangular image. Screen mapping is linear in degrees,
/// which is good enough for placing markers while authoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub yaw: f64,
    pub pitch: f64,
    pub hfov: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { yaw: 0.0, pitch: 0.0, hfov: DEFAULT_HFOV }
    }
}

impl Camera {
    pub fn orientation(&self) -> Orientation {
        Orientation { pitch: self.pitch, yaw: self.yaw, hfov: self.hfov }
    }

    pub fn vfov(&self, view: Rect) -> f64 {
        let aspect = (view.width() / view.height().max(1.0)) as f64;
        (self.hfov / aspect.max(f64::EPSILON)).min(180.0)
    }

    /// Keeps the visible window between the poles and the zoom inside its limits.
    pub fn keep_in_bounds(&mut self, view: Rect) {
        self.hfov = self.hfov.clamp(MIN_HFOV, MAX_HFOV);
        self.yaw = normalize_yaw(self.yaw);
        let half = self.vfov(view) / 2.0;
        self.pitch = if half >= 90.0 { 0.0 } else { self.pitch.clamp(-90.0 + half, 90.0 - half) };
    }

    pub fn drag(&mut self, delta: Vec2, view: Rect) {
        let degrees_per_pixel = self.hfov / view.width().max(1.0) as f64;
        self.yaw -= delta.x as f64 * degrees_per_pixel;
        self.pitch += delta.y as f64 * degrees_per_pixel;
        self.keep_in_bounds(view);
    }

    pub fn zoom(&mut self, scroll: f32, view: Rect) {
        self.hfov *= 1.0 - scroll as f64 * 0.002;
        self.keep_in_bounds(view);
    }

    /// Screen position of a point on the sphere, `None` when it is outside the view.
    pub fn project(&self, pitch: f64, yaw: f64, view: Rect) -> Option<Pos2> {
        let vfov = self.vfov(view);
        let dx = normalize_yaw(yaw - self.yaw);
        let dy = pitch - self.pitch;
        if dx.abs() > self.hfov / 2.0 || dy.abs() > vfov / 2.0 {
            return None;
        }

        let center = view.center();
        Some(Pos2::new(center.x + (dx / self.hfov) as f32 * view.width(), center.y - (dy / vfov) as f32 * view.height()))
    }

    /// Sphere coordinates `(pitch, yaw)` under a screen position.
    pub fn unproject(&self, pos: Pos2, view: Rect) -> (f64, f64) {
        let center = view.center();
        let dx = (pos.x - center.x) as f64 / view.width().max(1.0) as f64 * self.hfov;
        let dy = (center.y - pos.y) as f64 / view.height().max(1.0) as f64 * self.vfov(view);
        (clamp_pitch(self.pitch + dy), normalize_yaw(self.yaw + dx))
    }

    /// Texture coordinates of the visible window. `u` may leave `0..1`; the
    /// texture is sampled with horizontal wrapping.
    pub fn uv_rect(&self, view: Rect) -> Rect {
        let vfov = self.vfov(view);
        let u0 = (self.yaw - self.hfov / 2.0 + 180.0) / 360.0;
        let v0 = (90.0 - (self.pitch + vfov / 2.0)) / 180.0;
        Rect::from_min_max(Pos2::new(u0 as f32, v0 as f32), Pos2::new((u0 + self.hfov / 360.0) as f32, (v0 + vfov / 180.0) as f32))
    }
}

/// Eased camera move started by `look_at`.
#[derive(Debug, Clone, Copy)]
pub struct CameraAnimation {
    from_yaw: f64,
    from_pitch: f64,
    to_yaw: f64,
    to_pitch: f64,
    started: Instant,
    duration: Duration,
}

impl CameraAnimation {
    pub fn new(camera: &Camera, yaw: f64, pitch: f64, now: Instant, duration: Duration) -> Self {
        // Go the short way around the seam
        let to_yaw = camera.yaw + normalize_yaw(yaw - camera.yaw);
        Self { from_yaw: camera.yaw, from_pitch: camera.pitch, to_yaw, to_pitch: clamp_pitch(pitch), started: now, duration }
    }

    /// Returns `(yaw, pitch, finished)` at `now`.
    pub fn sample(&self, now: Instant) -> (f64, f64, bool) {
        let elapsed = now.saturating_duration_since(self.started);
        if self.duration.is_zero() || elapsed >= self.duration {
            return (normalize_yaw(self.to_yaw), self.to_pitch, true);
        }

        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        let eased = t * t * (3.0 - 2.0 * t);
        let yaw = self.from_yaw + (self.to_yaw - self.from_yaw) * eased;
        let pitch = self.from_pitch + (self.to_pitch - self.from_pitch) * eased;
        (normalize_yaw(yaw), pitch, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> Rect {
        Rect::from_min_size(Pos2::ZERO, Vec2::new(1000.0, 500.0))
    }

    #[test]
    fn yaw_wraps_into_half_open_range() {
        assert_eq!(normalize_yaw(190.0), -170.0);
        assert_eq!(normalize_yaw(-180.0), 180.0);
        assert_eq!(normalize_yaw(540.0), 180.0);
        assert_eq!(normalize_yaw(42.0), 42.0);
    }

    #[test]
    fn camera_center_projects_to_view_center() {
        let camera = Camera { yaw: 30.0, pitch: 10.0, hfov: 90.0 };
        let pos = camera.project(10.0, 30.0, view()).unwrap();
        assert_eq!(pos, view().center());
    }

    #[test]
    fn project_and_unproject_agree() {
        let camera = Camera { yaw: 170.0, pitch: -5.0, hfov: 100.0 };
        let pos = camera.project(-2.1, -170.0, view()).expect("point across the seam is visible");
        let (pitch, yaw) = camera.unproject(pos, view());
        assert!((pitch - -2.1).abs() < 1e-3);
        assert!((yaw - -170.0).abs() < 1e-3);
    }

    #[test]
    fn points_behind_the_camera_are_hidden() {
        let camera = Camera::default();
        assert!(camera.project(0.0, 180.0, view()).is_none());
    }

    #[test]
    fn pitch_is_kept_away_from_the_poles() {
        let mut camera = Camera { yaw: 0.0, pitch: 89.0, hfov: 100.0 };
        camera.keep_in_bounds(view());
        let half = camera.vfov(view()) / 2.0;
        assert!(camera.pitch + half <= 90.0 + 1e-9);
    }

    #[test]
    fn animation_takes_the_short_way_around() {
        let camera = Camera { yaw: 170.0, pitch: 0.0, hfov: 100.0 };
        let start = Instant::now();
        let animation = CameraAnimation::new(&camera, -170.0, 0.0, start, Duration::from_millis(100));
        let (yaw, _, done) = animation.sample(start + Duration::from_millis(50));
        assert!(!done);
        assert!(yaw.abs() > 170.0, "midpoint should be near the seam, got {yaw}");
        let (yaw, _, done) = animation.sample(start + Duration::from_millis(200));
        assert!(done);
        assert_eq!(yaw, -170.0);
    }
}
