//! End-to-end propagation scenarios
//!
//! Author: Moroya Sakamoto

mod common;

use common::*;
use lensopt::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg32;

#[test]
fn test_flat_surface_intersections_preserve_x() {
    // Flat surface at height 0 with matched indices: 5 parallel rays from
    // z = -30 at x = {-2, -1, 0, 1, 2} intersect at z = 0 with no lateral
    // shift and no bending.
    let surfaces = flat_air();
    let mut bundle = RayBundle::for_display(5, 1).unwrap();
    bundle.sample_uniform(2.0, 0.0);

    let launch_x: Vec<f32> = bundle.rays().iter().map(|r| r.origin.x).collect();
    assert_eq!(launch_x, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);

    intersect_bundle(&mut bundle, &surfaces[0]);
    for (ray, &x) in bundle.rays().iter().zip(&launch_x) {
        assert!(ray.endpoint.z.abs() < 1e-5);
        assert!((ray.endpoint.x - x).abs() < 1e-5);
    }

    refract_bundle(&mut bundle, &surfaces[0]);
    for ray in bundle.rays() {
        assert!(ray.alive);
        assert!((ray.direction - glam::Vec3::Z).length() < 1e-6);
    }
}

#[test]
fn test_curved_surface_intersection_converges() {
    // Curvature 0.01, height -10, indices (1, 1.5): the fixed-count solver
    // leaves a residual below 1e-4 for rays within half-width 1.
    let surfaces = singlet();
    let mut bundle = RayBundle::for_display(10, 1).unwrap();
    bundle.sample_uniform(1.0, 0.0);
    intersect_bundle(&mut bundle, &surfaces[0]);
    assert!(surface_residual(&bundle, &surfaces[0]) < 1e-4);
}

#[test]
fn test_demo_stack_reaches_image_plane() {
    let mut bundle = sampled_fan(10, 3, 1.0);
    propagate_bundle(&mut bundle, &demo_stack(), 15.0);
    let mut alive = 0;
    for ray in bundle.rays().iter().filter(|r| r.alive) {
        assert!((ray.endpoint.z - 15.0).abs() < 1e-4);
        assert_eq!(ray.endpoint, ray.origin + ray.direction * ray.t);
        alive += 1;
    }
    assert!(alive > 0);
}

#[test]
fn test_disk_sampler_respects_disk_over_many_samples() {
    let mut bundle = RayBundle::for_optimization(10, 1).unwrap();
    let mut rng = Pcg32::seed_from_u64(11);
    let mut seen = 0usize;
    while seen < 10_000 {
        bundle.sample_disk(3.0, 0.0, &mut rng);
        for ray in bundle.rays() {
            let r2 = ray.origin.x * ray.origin.x + ray.origin.y * ray.origin.y;
            assert!(r2 <= 9.0 + 1e-6);
        }
        seen += bundle.rays().len();
    }
}

#[test]
fn test_dual_backend_agrees_with_scalar_on_demo_stack() {
    let surfaces = demo_stack();
    let bundle = sampled_opt_bundle(6, 2, 2.0, 5);

    for tracked in 0..surfaces.len() {
        let lifted: Vec<DualSurface> = surfaces
            .iter()
            .enumerate()
            .map(|(i, s)| {
                if i == tracked {
                    DualSurface::tracked(s)
                } else {
                    DualSurface::frozen(s)
                }
            })
            .collect();
        let dual_rays = trace_bundle_dual(&bundle, &lifted, 15.0);

        let mut scalar = bundle.clone();
        propagate_bundle(&mut scalar, &surfaces, 15.0);

        for (s, d) in scalar.rays().iter().zip(&dual_rays) {
            assert_eq!(s.alive, d.alive);
            if s.alive {
                assert!((s.endpoint - d.endpoint.value()).length() < 1e-4);
            }
        }
    }
}

#[test]
fn test_loss_zero_for_perfectly_focused_slot() {
    // Force every endpoint in the bundle to one point: the loss must be
    // exactly zero.
    let mut bundle = sampled_opt_bundle(5, 2, 1.0, 3);
    propagate_bundle(&mut bundle, &demo_stack(), 15.0);
    let focus = glam::Vec3::new(0.1, 0.0, 15.0);
    for ray in bundle.rays_mut() {
        ray.endpoint = focus;
    }
    assert_eq!(spot_loss(&bundle), 0.0);
}

#[test]
fn test_display_fan_and_spot_interface() {
    let config = SimConfig {
        seed: Some(8),
        ..SimConfig::default()
    };
    let mut sim = LensSim::new(demo_stack(), config).unwrap();

    let stages = sim.display_fan();
    assert_eq!(stages.len(), sim.surfaces().len() + 1);
    for stage in &stages {
        assert_eq!(stage.len(), sim.config().fov_slots);
    }

    let spots = sim.spot_diagram();
    assert_eq!(spots.len(), sim.config().fov_slots);
    for slot in &spots {
        assert!(!slot.is_empty());
    }

    let profile = sim.surface(0).unwrap().sample_profile(10.0, 200);
    assert_eq!(profile.len(), 200);
}

#[test]
fn test_prescription_round_trips_through_json() {
    let stack = demo_stack();
    let json = serde_json::to_string(&stack).unwrap();
    let parsed: Vec<AsphericSurface> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), stack.len());
    for (a, b) in stack.iter().zip(&parsed) {
        assert_eq!(a.height(), b.height());
        assert_eq!(a.curvature(), b.curvature());
        assert_eq!(a.params(), b.params());
    }
    // A prescription may omit the shape coefficients entirely.
    let minimal: AsphericSurface =
        serde_json::from_str(r#"{"height":-5.0,"curvature":0.02,"n_in":1.0,"n_out":1.5}"#).unwrap();
    assert_eq!(minimal.params(), &[0.0; MAX_ORDER]);
}
