//! Core ray types and batch sampling
//!
//! A [`RayBundle`] is a flat, slot-major batch of rays: all rays sharing a
//! field-of-view slot (one nominal launch angle) are contiguous, so per-slot
//! reductions run over plain chunks. Bundles are re-populated in place by the
//! sampling kernels every forward pass; the backing storage is never
//! reallocated.
//!
//! Author: Moroya Sakamoto

use glam::{Vec2, Vec3};
use rand::Rng;
use rayon::prelude::*;

use crate::error::LensError;

/// Launch plane for all ray bundles, behind the first surface.
pub const LAUNCH_Z: f32 = -30.0;

/// Rejection count at which the disk sampler emits a diagnostic.
const DISK_RETRY_WARN: u32 = 1000;

/// A single ray: origin, direction, and the current endpoint at parametric
/// distance `t`.
///
/// Invariant: `endpoint == origin + t * direction` after every propagation
/// step. `direction` is unit-length at launch and stays unit-ish through
/// refraction; it is never renormalized.
#[derive(Debug, Clone, Copy)]
pub struct Ray3 {
    /// Ray origin point
    pub origin: Vec3,
    /// Ray direction
    pub direction: Vec3,
    /// Current endpoint
    pub endpoint: Vec3,
    /// Parametric distance to the endpoint
    pub t: f32,
    /// Cleared on total internal reflection; dead rays are excluded from
    /// loss accumulation and display output
    pub alive: bool,
}

impl Ray3 {
    /// Create a ray at its launch state (endpoint at the origin, `t = 0`).
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Ray3 {
            origin,
            direction,
            endpoint: origin,
            t: 0.0,
            alive: true,
        }
    }

    /// Move the endpoint to parametric distance `t`.
    #[inline]
    pub fn propagate(&mut self, t: f32) {
        self.t = t;
        self.endpoint = self.origin + self.direction * t;
    }

    /// Closed-form intersection with the plane `z = height`.
    ///
    /// Also the seed for the iterative surface intersection.
    #[inline]
    pub fn intersect_plane(&mut self, height: f32) {
        let t = (height - self.origin.z) / self.direction.z;
        self.propagate(t);
    }
}

/// A batch of rays indexed by (ray-slot, field-of-view-slot).
///
/// Storage is slot-major: slot `j` occupies
/// `rays[j * ray_count .. (j + 1) * ray_count]`.
#[derive(Debug, Clone)]
pub struct RayBundle {
    rays: Vec<Ray3>,
    ray_count: usize,
    fov_count: usize,
}

impl RayBundle {
    /// Display-sized bundle: `ray_count` rays per field-of-view slot.
    pub fn for_display(ray_count: usize, fov_count: usize) -> Result<Self, LensError> {
        Self::with_counts(ray_count, fov_count)
    }

    /// Optimization-sized bundle: `ray_count²` rays per slot, for denser
    /// random sampling.
    pub fn for_optimization(ray_count: usize, fov_count: usize) -> Result<Self, LensError> {
        Self::with_counts(ray_count * ray_count, fov_count)
    }

    fn with_counts(ray_count: usize, fov_count: usize) -> Result<Self, LensError> {
        if ray_count < 2 || fov_count < 1 {
            return Err(LensError::BundleTooSmall {
                rays: ray_count,
                fovs: fov_count,
            });
        }
        let blank = Ray3::new(Vec3::new(0.0, 0.0, LAUNCH_Z), Vec3::Z);
        Ok(RayBundle {
            rays: vec![blank; ray_count * fov_count],
            ray_count,
            fov_count,
        })
    }

    /// Rays per field-of-view slot.
    #[inline]
    pub fn ray_count(&self) -> usize {
        self.ray_count
    }

    /// Number of field-of-view slots.
    #[inline]
    pub fn fov_count(&self) -> usize {
        self.fov_count
    }

    /// All rays, slot-major.
    #[inline]
    pub fn rays(&self) -> &[Ray3] {
        &self.rays
    }

    /// All rays, mutable.
    #[inline]
    pub fn rays_mut(&mut self) -> &mut [Ray3] {
        &mut self.rays
    }

    /// Iterate slots as contiguous chunks.
    #[inline]
    pub fn slots(&self) -> std::slice::Chunks<'_, Ray3> {
        self.rays.chunks(self.ray_count)
    }

    /// Launch angle (radians) for slot `j`, given the maximum field angle in
    /// degrees. Slot 0 is on-axis; a single slot is always on-axis.
    #[inline]
    fn slot_angle(&self, j: usize, fov_deg: f32) -> f32 {
        let delta = if self.fov_count > 1 {
            fov_deg / (self.fov_count - 1) as f32
        } else {
            0.0
        };
        (delta * j as f32).to_radians()
    }

    /// Deterministic fan: origins evenly spaced on a line across
    /// `[-half_width, half_width]` at y = 0, one launch angle per slot.
    ///
    /// Used for visualization fans.
    pub fn sample_uniform(&mut self, half_width: f32, fov_deg: f32) {
        let delta_pos = 2.0 * half_width / (self.ray_count - 1) as f32;
        for j in 0..self.fov_count {
            let theta = self.slot_angle(j, fov_deg);
            let dir = Vec3::new(theta.sin(), 0.0, theta.cos());
            let base = j * self.ray_count;
            for i in 0..self.ray_count {
                let origin = Vec3::new(delta_pos * i as f32 - half_width, 0.0, LAUNCH_Z);
                self.rays[base + i] = Ray3::new(origin, dir);
            }
        }
    }

    /// Random disk: origins uniform over the disk of radius `half_width`
    /// via rejection sampling, one launch angle per slot (only origins are
    /// randomized within a slot).
    ///
    /// Used for optimization bundles. The rejection loop is unbounded to
    /// keep the distribution uniform; pathological retry runs are reported
    /// at debug level.
    pub fn sample_disk<R: Rng>(&mut self, half_width: f32, fov_deg: f32, rng: &mut R) {
        for j in 0..self.fov_count {
            let theta = self.slot_angle(j, fov_deg);
            let dir = Vec3::new(theta.sin(), 0.0, theta.cos());
            let base = j * self.ray_count;
            for i in 0..self.ray_count {
                let (x, y) = sample_in_disk(half_width, rng);
                self.rays[base + i] = Ray3::new(Vec3::new(x, y, LAUNCH_Z), dir);
            }
        }
    }

    /// Intersect every alive ray with the plane `z = height` (closed form).
    pub fn intersect_plane(&mut self, height: f32) {
        self.rays.par_iter_mut().for_each(|ray| {
            if !ray.alive {
                return;
            }
            ray.intersect_plane(height);
        });
    }

    /// Move every alive ray's endpoint to parametric distance `t`.
    pub fn propagate(&mut self, t: f32) {
        self.rays.par_iter_mut().for_each(|ray| {
            if !ray.alive {
                return;
            }
            ray.propagate(t);
        });
    }

    /// (origin, endpoint) pairs of alive rays, grouped by field-of-view slot.
    pub fn segments(&self) -> Vec<Vec<(Vec3, Vec3)>> {
        self.slots()
            .map(|slot| {
                slot.iter()
                    .filter(|r| r.alive)
                    .map(|r| (r.origin, r.endpoint))
                    .collect()
            })
            .collect()
    }

    /// Lateral endpoint coordinates of alive rays, grouped by slot.
    ///
    /// The spread of one group is the spot diagram for that field of view.
    pub fn spot_points(&self) -> Vec<Vec<Vec2>> {
        self.slots()
            .map(|slot| {
                slot.iter()
                    .filter(|r| r.alive)
                    .map(|r| r.endpoint.truncate())
                    .collect()
            })
            .collect()
    }
}

/// Draw a point uniformly from the disk of the given radius by rejection.
#[inline]
fn sample_in_disk<R: Rng>(radius: f32, rng: &mut R) -> (f32, f32) {
    let mut tries = 0u32;
    loop {
        let x = rng.random_range(-radius..=radius);
        let y = rng.random_range(-radius..=radius);
        if x * x + y * y <= radius * radius {
            return (x, y);
        }
        tries += 1;
        if tries == DISK_RETRY_WARN {
            log::debug!("disk sampler: {} rejections at radius {}", tries, radius);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_propagate_invariant() {
        let mut ray = Ray3::new(Vec3::new(1.0, 2.0, -30.0), Vec3::new(0.0, 0.0, 1.0));
        ray.propagate(12.5);
        assert_eq!(ray.endpoint, ray.origin + ray.direction * ray.t);
        assert_eq!(ray.t, 12.5);
    }

    #[test]
    fn test_plane_round_trip() {
        let mut ray = Ray3::new(Vec3::new(-2.0, 0.5, -30.0), Vec3::new(0.1, 0.0, 1.0));
        ray.intersect_plane(7.0);
        assert!((ray.endpoint.z - 7.0).abs() < 1e-5);
    }

    #[test]
    fn test_bundle_too_small() {
        assert!(RayBundle::for_display(1, 3).is_err());
        assert!(RayBundle::for_display(2, 0).is_err());
        assert!(RayBundle::for_display(2, 1).is_ok());
    }

    #[test]
    fn test_uniform_fan_layout() {
        let mut bundle = RayBundle::for_display(5, 3).unwrap();
        bundle.sample_uniform(2.0, 10.0);

        // Origins span [-2, 2] at y = 0 in every slot.
        for slot in bundle.slots() {
            assert_eq!(slot[0].origin.x, -2.0);
            assert_eq!(slot[4].origin.x, 2.0);
            for ray in slot {
                assert_eq!(ray.origin.y, 0.0);
                assert_eq!(ray.origin.z, LAUNCH_Z);
            }
        }

        // Slot 0 is on-axis, the last slot launches at the full field angle.
        let slots: Vec<_> = bundle.slots().collect();
        assert!(slots[0][0].direction.x.abs() < 1e-7);
        let expected = 10.0_f32.to_radians().sin();
        assert!((slots[2][0].direction.x - expected).abs() < 1e-6);
    }

    #[test]
    fn test_disk_sampling_stays_in_disk() {
        let mut bundle = RayBundle::for_optimization(10, 1).unwrap();
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..100 {
            bundle.sample_disk(3.0, 0.0, &mut rng);
            for ray in bundle.rays() {
                let r2 = ray.origin.x * ray.origin.x + ray.origin.y * ray.origin.y;
                assert!(r2 <= 9.0 + 1e-6);
            }
        }
    }

    #[test]
    fn test_disk_sampling_deterministic_under_seed() {
        let mut a = RayBundle::for_optimization(4, 2).unwrap();
        let mut b = RayBundle::for_optimization(4, 2).unwrap();
        let mut rng_a = Pcg32::seed_from_u64(99);
        let mut rng_b = Pcg32::seed_from_u64(99);
        a.sample_disk(3.0, 5.0, &mut rng_a);
        b.sample_disk(3.0, 5.0, &mut rng_b);
        for (ra, rb) in a.rays().iter().zip(b.rays()) {
            assert_eq!(ra.origin, rb.origin);
            assert_eq!(ra.direction, rb.direction);
        }
    }

    #[test]
    fn test_slot_shares_direction() {
        let mut bundle = RayBundle::for_optimization(6, 3).unwrap();
        let mut rng = Pcg32::seed_from_u64(1);
        bundle.sample_disk(3.0, 20.0, &mut rng);
        for slot in bundle.slots() {
            let dir = slot[0].direction;
            for ray in slot {
                assert_eq!(ray.direction, dir);
            }
        }
    }

    #[test]
    fn test_dead_rays_skip_kernels_and_output() {
        let mut bundle = RayBundle::for_display(3, 1).unwrap();
        bundle.sample_uniform(1.0, 0.0);
        bundle.rays_mut()[1].alive = false;
        let before = bundle.rays()[1].endpoint;
        bundle.intersect_plane(15.0);
        assert_eq!(bundle.rays()[1].endpoint, before);
        assert_eq!(bundle.segments()[0].len(), 2);
        assert_eq!(bundle.spot_points()[0].len(), 2);
    }
}
