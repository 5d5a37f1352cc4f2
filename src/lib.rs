//! # LENSOPT
//!
//! **Differentiable aspheric lens simulation and spot-size optimization**
//!
//! Traces large parallel batches of rays through a stack of rotationally
//! symmetric aspherical surfaces and optimizes each surface's shape
//! parameters by gradient descent, with the gradients obtained by
//! forward-mode automatic differentiation through the entire pipeline,
//! including the iterative ray-surface intersection solver.
//!
//! ## Features
//!
//! - **Surfaces**: base conic + even polynomial corrections, analytic
//!   tangents and normals
//! - **Ray bundles**: deterministic fans for display, rejection-sampled
//!   disk bundles for optimization, rayon-parallel batch kernels
//! - **Intersection**: fixed-count Newton-Raphson solve, scalar and dual
//!   backends with matching endpoints
//! - **Refraction**: vector Snell's law with explicit total-internal-
//!   reflection termination
//! - **Loss**: per-field-of-view spot-centroid variance
//! - **Optimizer**: two-mode state machine with scaled gradient-descent
//!   updates
//!
//! ## Example
//!
//! ```rust
//! use lensopt::prelude::*;
//!
//! let config = SimConfig {
//!     max_iters: 5,
//!     seed: Some(7),
//!     ..SimConfig::default()
//! };
//! let mut sim = LensSim::new(LensSim::demo_stack(), config).unwrap();
//!
//! sim.start_optimization();
//! while let StepOutcome::Iterated { .. } = sim.step() {}
//!
//! assert!(sim.loss().is_finite());
//! assert_eq!(sim.mode(), Mode::Interactive);
//! ```
//!
//! ## Modules
//!
//! - [`types`]: rays, bundles, sampling kernels
//! - [`surface`]: the aspherical surface model
//! - [`autodiff`]: parameter-space dual numbers
//! - [`trace`]: intersection solver and refraction, both backends
//! - [`loss`]: spot-variance reduction
//! - [`optimize`]: simulation state and the optimization loop
//!
//! Author: Moroya Sakamoto

#![warn(missing_docs)]

pub mod autodiff;
pub mod error;
pub mod loss;
pub mod optimize;
pub mod surface;
pub mod trace;
pub mod types;

pub use error::LensError;
pub use optimize::LensSim;
pub use surface::AsphericSurface;
pub use types::RayBundle;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::autodiff::{Dual3, DualSurface, DualVec3};
    pub use crate::error::LensError;
    pub use crate::loss::{spot_centroids, spot_loss, spot_loss_dual};
    pub use crate::optimize::{
        loss_and_gradients, LensSim, Mode, SimConfig, StepOutcome, SurfaceGrads,
    };
    pub use crate::surface::{AsphericSurface, CURVATURE_RANGE, HEIGHT_RANGE, MAX_ORDER};
    pub use crate::trace::{
        intersect_bundle, propagate_bundle, refract_bundle, surface_residual, trace_bundle_dual,
        vector_refract, DualRay, NEWTON_ITERS,
    };
    pub use crate::types::{Ray3, RayBundle, LAUNCH_Z};
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn test_demo_trace_smoke() {
        let mut bundle = RayBundle::for_display(10, 3).unwrap();
        bundle.sample_uniform(3.0, 1.0);
        propagate_bundle(&mut bundle, &LensSim::demo_stack(), 15.0);
        for ray in bundle.rays().iter().filter(|r| r.alive) {
            assert!(ray.endpoint.is_finite());
            assert!((ray.endpoint.z - 15.0).abs() < 1e-4);
        }
    }
}
