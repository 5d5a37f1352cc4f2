//! Ray–surface intersection and refraction
//!
//! The intersection solver seeds `t` from the closed-form intersection with
//! the plane `z = surface.height`, then runs a fixed count of Newton-Raphson
//! iterations against the sag. There is no convergence check: every ray
//! stays on the same instruction stream, and the dual backend differentiates
//! through the whole solve. Accuracy is bounded, observable through
//! [`surface_residual`].
//!
//! Two backends share the algorithm:
//! - the **scalar backend** (`f32`) drives display refresh and plain loss
//!   evaluation;
//! - the **dual backend** ([`Dual3`] arithmetic) chains parameter
//!   derivatives through all solver iterations, the refraction, and the
//!   image-plane projection.
//!
//! Both produce identical endpoints for identical inputs.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use rayon::prelude::*;

use crate::autodiff::{Dual3, DualSurface, DualVec3};
use crate::surface::AsphericSurface;
use crate::types::{Ray3, RayBundle};

/// Fixed Newton-Raphson iteration count for the intersection solver.
pub const NEWTON_ITERS: u32 = 10;

// ============================================================================
// Scalar backend
// ============================================================================

/// Vector form of Snell's law.
///
/// `d` is the incident direction, `n` the unit normal oriented against `d`,
/// `eta = n_in / n_out`. Returns `None` on total internal reflection
/// (`sin²θₜ > 1`) instead of an undefined direction.
#[inline(always)]
pub fn vector_refract(d: Vec3, n: Vec3, eta: f32) -> Option<Vec3> {
    let cos_i = -n.dot(d);
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
    if sin2_t > 1.0 {
        return None;
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    Some(d * eta + n * (eta * cos_i - cos_t))
}

/// Advance one ray to its intersection with a surface.
///
/// Plane seed at the surface vertex, then [`NEWTON_ITERS`] Newton steps on
/// `sag(endpoint.xy) - endpoint.z`.
#[inline]
pub fn intersect_surface(ray: &mut Ray3, surf: &AsphericSurface) {
    ray.intersect_plane(surf.height());
    for _ in 0..NEWTON_ITERS {
        let delta = surf.sag(ray.endpoint.x, ray.endpoint.y) - ray.endpoint.z;
        let n = surf.normal(ray.endpoint.x, ray.endpoint.y);
        let t = ray.t - delta / ray.direction.dot(n);
        ray.propagate(t);
    }
}

/// Refract one ray at its current endpoint.
///
/// Moves the origin to the endpoint and bends the direction; a totally
/// internally reflected ray is terminated.
#[inline]
pub fn refract_surface(ray: &mut Ray3, surf: &AsphericSurface) {
    let n = surf.normal(ray.endpoint.x, ray.endpoint.y);
    match vector_refract(ray.direction, n, surf.n_in / surf.n_out) {
        Some(dir) => {
            ray.origin = ray.endpoint;
            ray.direction = dir;
            ray.t = 0.0;
        }
        None => ray.alive = false,
    }
}

/// Intersect every alive ray in a bundle with a surface.
pub fn intersect_bundle(bundle: &mut RayBundle, surf: &AsphericSurface) {
    bundle.rays_mut().par_iter_mut().for_each(|ray| {
        if !ray.alive {
            return;
        }
        intersect_surface(ray, surf);
    });
}

/// Refract every alive ray in a bundle at a surface.
pub fn refract_bundle(bundle: &mut RayBundle, surf: &AsphericSurface) {
    bundle.rays_mut().par_iter_mut().for_each(|ray| {
        if !ray.alive {
            return;
        }
        refract_surface(ray, surf);
    });
}

/// Propagate a bundle through an ordered surface stack and project the
/// result onto the image plane.
pub fn propagate_bundle(bundle: &mut RayBundle, surfaces: &[AsphericSurface], image_z: f32) {
    for surf in surfaces {
        intersect_bundle(bundle, surf);
        refract_bundle(bundle, surf);
    }
    bundle.intersect_plane(image_z);
}

/// Largest `|sag(endpoint.xy) - endpoint.z|` over the alive rays of a
/// bundle sitting on a surface.
///
/// Diagnostic only: the solver itself never checks convergence.
pub fn surface_residual(bundle: &RayBundle, surf: &AsphericSurface) -> f32 {
    bundle
        .rays()
        .par_iter()
        .filter(|r| r.alive)
        .map(|r| (surf.sag(r.endpoint.x, r.endpoint.y) - r.endpoint.z).abs())
        .reduce(|| 0.0, f32::max)
}

// ============================================================================
// Dual backend
// ============================================================================

/// Ray state in dual arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct DualRay {
    /// Ray origin.
    pub origin: DualVec3,
    /// Ray direction.
    pub direction: DualVec3,
    /// Current endpoint.
    pub endpoint: DualVec3,
    /// Parametric distance to the endpoint.
    pub t: Dual3,
    /// Cleared on total internal reflection.
    pub alive: bool,
}

#[inline]
fn intersect_plane_dual(ray: &mut DualRay, height: Dual3) {
    let t = (height - ray.origin.z) / ray.direction.z;
    ray.t = t;
    ray.endpoint = ray.origin + ray.direction * t;
}

#[inline]
fn intersect_surface_dual(ray: &mut DualRay, surf: &DualSurface) {
    intersect_plane_dual(ray, surf.height);
    for _ in 0..NEWTON_ITERS {
        let delta = surf.sag(ray.endpoint.x, ray.endpoint.y) - ray.endpoint.z;
        let n = surf.normal(ray.endpoint.x, ray.endpoint.y);
        let t = ray.t - delta / ray.direction.dot(n);
        ray.t = t;
        ray.endpoint = ray.origin + ray.direction * t;
    }
}

#[inline]
fn vector_refract_dual(d: DualVec3, n: DualVec3, eta: f32) -> Option<DualVec3> {
    let cos_i = -n.dot(d);
    let sin2_t = (Dual3::constant(1.0) - cos_i * cos_i) * (eta * eta);
    if sin2_t.val > 1.0 {
        return None;
    }
    let cos_t = (Dual3::constant(1.0) - sin2_t).sqrt();
    Some(d * eta + n * (cos_i * eta - cos_t))
}

/// Trace one launch state through a lifted surface stack to the image plane.
///
/// Partials flow from the tracked surface's parameters through every Newton
/// iteration of its own and every later surface's solve, each refraction,
/// and the final plane projection. A ray terminated by total internal
/// reflection keeps its last endpoint and is flagged dead.
pub fn trace_dual(
    origin: Vec3,
    direction: Vec3,
    surfaces: &[DualSurface],
    image_z: f32,
) -> DualRay {
    let mut ray = DualRay {
        origin: DualVec3::constant(origin),
        direction: DualVec3::constant(direction),
        endpoint: DualVec3::constant(origin),
        t: Dual3::constant(0.0),
        alive: true,
    };

    for surf in surfaces {
        intersect_surface_dual(&mut ray, surf);
        let n = surf.normal(ray.endpoint.x, ray.endpoint.y);
        match vector_refract_dual(ray.direction, n, surf.n_in / surf.n_out) {
            Some(dir) => {
                ray.origin = ray.endpoint;
                ray.direction = dir;
                ray.t = Dual3::constant(0.0);
            }
            None => {
                ray.alive = false;
                return ray;
            }
        }
    }
    intersect_plane_dual(&mut ray, Dual3::constant(image_z));
    ray
}

/// Trace a bundle's launch states through a lifted stack, in parallel.
///
/// Reads the bundle's sampled origins/directions without mutating it.
pub fn trace_bundle_dual(
    bundle: &RayBundle,
    surfaces: &[DualSurface],
    image_z: f32,
) -> Vec<DualRay> {
    bundle
        .rays()
        .par_iter()
        .map(|r| trace_dual(r.origin, r.direction, surfaces, image_z))
        .collect()
}
