//! Common test helpers for lensopt integration tests
//!
//! Author: Moroya Sakamoto

#![allow(dead_code)]

use lensopt::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg32;

// ============================================================================
// Standard surface stacks
// ============================================================================

/// The canonical four-surface demo stack.
pub fn demo_stack() -> Vec<AsphericSurface> {
    LensSim::demo_stack()
}

/// Single weakly curved refracting surface in air-to-glass.
pub fn singlet() -> Vec<AsphericSurface> {
    vec![AsphericSurface::new(-10.0, 0.01, 1.0, 1.5).unwrap()]
}

/// Single flat surface with matched indices: no bending anywhere.
pub fn flat_air() -> Vec<AsphericSurface> {
    vec![AsphericSurface::new(0.0, 0.0, 1.0, 1.0).unwrap()]
}

// ============================================================================
// Standard bundles
// ============================================================================

/// Optimization-sized bundle, disk-sampled under a fixed seed.
pub fn sampled_opt_bundle(
    rays_per_slot: usize,
    fov_slots: usize,
    fov_deg: f32,
    seed: u64,
) -> RayBundle {
    let mut bundle = RayBundle::for_optimization(rays_per_slot, fov_slots).unwrap();
    let mut rng = Pcg32::seed_from_u64(seed);
    bundle.sample_disk(3.0, fov_deg, &mut rng);
    bundle
}

/// Display-sized uniform fan.
pub fn sampled_fan(rays_per_slot: usize, fov_slots: usize, fov_deg: f32) -> RayBundle {
    let mut bundle = RayBundle::for_display(rays_per_slot, fov_slots).unwrap();
    bundle.sample_uniform(3.0, fov_deg);
    bundle
}
