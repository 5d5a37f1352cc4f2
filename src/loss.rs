//! Spot-variance loss
//!
//! Two-pass reduction over a fully propagated bundle: per-slot centroids of
//! the image-plane endpoints first, then the mean squared radial deviation
//! from the centroid, summed over slots. The centroid pass must complete
//! before the deviation pass starts; that barrier is the only cross-ray
//! dependency in the whole pipeline. Both passes recompute from zero on
//! every call.
//!
//! Rays terminated by total internal reflection are excluded; a slot's
//! denominators use its alive count.
//!
//! Author: Moroya Sakamoto

use glam::Vec2;
use rayon::prelude::*;

use crate::autodiff::Dual3;
use crate::trace::DualRay;
use crate::types::RayBundle;

// ============================================================================
// Scalar backend
// ============================================================================

/// Per-slot mean endpoint (x, y) over alive rays.
pub fn spot_centroids(bundle: &RayBundle) -> Vec<Vec2> {
    bundle
        .rays()
        .par_chunks(bundle.ray_count())
        .map(|slot| {
            let mut sum = Vec2::ZERO;
            let mut alive = 0u32;
            for ray in slot.iter().filter(|r| r.alive) {
                sum += ray.endpoint.truncate();
                alive += 1;
            }
            if alive > 0 {
                sum * (1.0 / alive as f32)
            } else {
                Vec2::ZERO
            }
        })
        .collect()
}

/// RMS-spot-size proxy: mean squared deviation of endpoints from their slot
/// centroid, summed over field-of-view slots.
///
/// Exactly zero when every alive ray in a slot shares one endpoint.
pub fn spot_loss(bundle: &RayBundle) -> f32 {
    let centroids = spot_centroids(bundle);
    bundle
        .rays()
        .par_chunks(bundle.ray_count())
        .enumerate()
        .map(|(j, slot)| {
            let centroid = centroids[j];
            let mut sum = 0.0;
            let mut alive = 0u32;
            for ray in slot.iter().filter(|r| r.alive) {
                let dev = ray.endpoint.truncate() - centroid;
                sum += dev.x * dev.x + dev.y * dev.y;
                alive += 1;
            }
            if alive > 0 {
                sum * (1.0 / alive as f32)
            } else {
                0.0
            }
        })
        .sum()
}

// ============================================================================
// Dual backend
// ============================================================================

/// Spot-variance loss over dual-traced rays, slot-major with `ray_count`
/// rays per slot. Partials of the loss with respect to the tracked surface's
/// parameters ride along.
pub fn spot_loss_dual(rays: &[DualRay], ray_count: usize) -> Dual3 {
    let zero = Dual3::constant(0.0);

    let centroids: Vec<(Dual3, Dual3)> = rays
        .chunks(ray_count)
        .map(|slot| {
            let mut sx = zero;
            let mut sy = zero;
            let mut alive = 0u32;
            for ray in slot.iter().filter(|r| r.alive) {
                sx = sx + ray.endpoint.x;
                sy = sy + ray.endpoint.y;
                alive += 1;
            }
            if alive > 0 {
                let inv = 1.0 / alive as f32;
                (sx * inv, sy * inv)
            } else {
                (zero, zero)
            }
        })
        .collect();

    let mut loss = zero;
    for (slot, &(cx, cy)) in rays.chunks(ray_count).zip(&centroids) {
        let mut sum = zero;
        let mut alive = 0u32;
        for ray in slot.iter().filter(|r| r.alive) {
            let ex = ray.endpoint.x - cx;
            let ey = ray.endpoint.y - cy;
            sum = sum + ex * ex + ey * ey;
            alive += 1;
        }
        if alive > 0 {
            loss = loss + sum * (1.0 / alive as f32);
        }
    }
    loss
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::DualVec3;
    use glam::Vec3;

    fn bundle_with_endpoints(endpoints: &[Vec3]) -> RayBundle {
        let mut bundle = RayBundle::for_display(endpoints.len(), 1).unwrap();
        for (ray, &e) in bundle.rays_mut().iter_mut().zip(endpoints) {
            ray.endpoint = e;
        }
        bundle
    }

    #[test]
    fn test_loss_zero_for_identical_endpoints() {
        let e = Vec3::new(0.3, -0.2, 15.0);
        let bundle = bundle_with_endpoints(&[e, e, e, e]);
        assert_eq!(spot_loss(&bundle), 0.0);
    }

    #[test]
    fn test_loss_known_variance() {
        // Endpoints at x = ±1: centroid 0, mean squared deviation 1.
        let bundle = bundle_with_endpoints(&[
            Vec3::new(1.0, 0.0, 15.0),
            Vec3::new(-1.0, 0.0, 15.0),
        ]);
        assert!((spot_loss(&bundle) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_centroid_ignores_dead_rays() {
        let mut bundle = bundle_with_endpoints(&[
            Vec3::new(1.0, 0.0, 15.0),
            Vec3::new(1.0, 0.0, 15.0),
            Vec3::new(100.0, 100.0, 15.0),
        ]);
        bundle.rays_mut()[2].alive = false;
        let centroids = spot_centroids(&bundle);
        assert!((centroids[0] - glam::Vec2::new(1.0, 0.0)).length() < 1e-6);
        assert_eq!(spot_loss(&bundle), 0.0);
    }

    #[test]
    fn test_loss_recomputes_from_zero() {
        let bundle = bundle_with_endpoints(&[
            Vec3::new(1.0, 0.0, 15.0),
            Vec3::new(-1.0, 0.0, 15.0),
        ]);
        let first = spot_loss(&bundle);
        let second = spot_loss(&bundle);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dual_loss_matches_scalar() {
        let endpoints = [
            Vec3::new(0.4, 0.1, 15.0),
            Vec3::new(-0.3, 0.2, 15.0),
            Vec3::new(0.1, -0.5, 15.0),
            Vec3::new(0.0, 0.0, 15.0),
        ];
        let bundle = bundle_with_endpoints(&endpoints);
        let dual_rays: Vec<DualRay> = endpoints
            .iter()
            .map(|&e| DualRay {
                origin: DualVec3::constant(Vec3::ZERO),
                direction: DualVec3::constant(Vec3::Z),
                endpoint: DualVec3::constant(e),
                t: Dual3::constant(0.0),
                alive: true,
            })
            .collect();
        let scalar = spot_loss(&bundle);
        let dual = spot_loss_dual(&dual_rays, 4);
        assert!((scalar - dual.val).abs() < 1e-6);
        assert_eq!(dual.grad(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_multi_slot_loss_sums_over_slots() {
        let mut bundle = RayBundle::for_display(2, 2).unwrap();
        // Slot 0: spread ±1 in x. Slot 1: spread ±2 in y.
        let rays = bundle.rays_mut();
        rays[0].endpoint = Vec3::new(1.0, 0.0, 15.0);
        rays[1].endpoint = Vec3::new(-1.0, 0.0, 15.0);
        rays[2].endpoint = Vec3::new(0.0, 2.0, 15.0);
        rays[3].endpoint = Vec3::new(0.0, -2.0, 15.0);
        assert!((spot_loss(&bundle) - (1.0 + 4.0)).abs() < 1e-6);
    }
}
