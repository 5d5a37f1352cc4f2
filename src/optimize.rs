//! Simulation state and gradient-descent optimization
//!
//! [`LensSim`] owns the whole running configuration (surface stack, ray
//! bundles, RNG, mode flag), keeping the numeric core free of hidden
//! globals. It is a two-mode state machine:
//!
//! - **Interactive**: live parameter edits for a selected surface are
//!   accepted; the optimizer is idle.
//! - **Optimizing**: each [`LensSim::step`] resamples the optimization
//!   bundle, differentiates the spot-variance loss with respect to every
//!   surface's `height`, `curvature`, and `params[1]`, and applies one
//!   scaled gradient-descent update. After the iteration cap the machine
//!   drops back to Interactive.
//!
//! The two parameter writers (interactive edits, optimizer updates) are
//! mutually exclusive through the mode flag, so no locking is involved.
//!
//! Author: Moroya Sakamoto

use glam::{Vec2, Vec3};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::autodiff::DualSurface;
use crate::error::{check_range, LensError};
use crate::loss::spot_loss_dual;
use crate::surface::AsphericSurface;
use crate::trace::{intersect_bundle, propagate_bundle, refract_bundle, trace_bundle_dual};
use crate::types::RayBundle;

/// Documented range for the field-of-view angle (degrees).
pub const FOV_RANGE: (f32, f32) = (0.0, 50.0);

/// Documented range for the learning-rate scale.
pub const LR_RANGE: (f32, f32) = (1.0, 100.0);

/// Documented range for the iteration cap.
pub const ITER_RANGE: (u32, u32) = (1, 100);

/// The learning-rate scale is divided by this before use.
pub const LR_DIVISOR: f32 = 1e6;

/// Per-parameter step scale for `height`, compensating its larger magnitude.
pub const HEIGHT_GRAD_SCALE: f32 = 1e4;

/// Per-parameter step scale for `params[1]`, compensating its sensitivity.
pub const COEFF_GRAD_SCALE: f32 = 1e-5;

/// Simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Rays per field-of-view slot in display bundles; squared for
    /// optimization bundles.
    pub rays_per_slot: usize,
    /// Number of field-of-view slots.
    pub fov_slots: usize,
    /// Maximum launch angle in degrees.
    pub fov_deg: f32,
    /// Radius of the launch disk / half-width of the launch line.
    pub bundle_radius: f32,
    /// Image plane position.
    pub image_z: f32,
    /// Learning-rate scale (divided by [`LR_DIVISOR`] before use).
    pub lr_scale: f32,
    /// Iterations per optimization run.
    pub max_iters: u32,
    /// RNG seed; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            rays_per_slot: 10,
            fov_slots: 3,
            fov_deg: 1.0,
            bundle_radius: 3.0,
            image_z: 15.0,
            lr_scale: 25.0,
            max_iters: 100,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Range-check every documented slider value.
    pub fn validate(&self) -> Result<(), LensError> {
        check_range("field of view", self.fov_deg, FOV_RANGE.0, FOV_RANGE.1)?;
        check_range("lr scale", self.lr_scale, LR_RANGE.0, LR_RANGE.1)?;
        check_iters(self.max_iters)?;
        check_range("bundle radius", self.bundle_radius, 1e-3, 20.0)?;
        Ok(())
    }
}

fn check_iters(n: u32) -> Result<(), LensError> {
    if n < ITER_RANGE.0 || n > ITER_RANGE.1 {
        return Err(LensError::ParamOutOfRange {
            name: "iteration cap",
            value: n as f32,
            min: ITER_RANGE.0 as f32,
            max: ITER_RANGE.1 as f32,
        });
    }
    Ok(())
}

/// Which writer currently owns the surface parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Live parameter edits accepted; optimizer idle.
    Interactive,
    /// Optimizer iterating; parameter edits rejected.
    Optimizing,
}

/// Result of one [`LensSim::step`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Interactive mode; nothing ran.
    Idle,
    /// One optimization iteration completed.
    Iterated {
        /// 1-based iteration index.
        iter: u32,
        /// Loss of this iteration's forward pass.
        loss: f32,
    },
    /// The iteration cap was reached; back in Interactive mode.
    Finished {
        /// Smallest loss observed during the run (diagnostic only).
        min_loss: f32,
    },
}

/// Loss gradients for one surface's optimized parameters.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceGrads {
    /// ∂loss/∂height.
    pub height: f32,
    /// ∂loss/∂curvature.
    pub curvature: f32,
    /// ∂loss/∂params\[1\].
    pub coeff: f32,
}

/// Differentiate the spot-variance loss with respect to every surface's
/// optimized parameters, over one sampled bundle.
///
/// One dual pass per surface, all over the same launch states; together the
/// passes are one forward pass differentiated against every parameter, so
/// all gradients are consistent with a single simultaneous update. The
/// returned loss is the shared value part of the passes.
pub fn loss_and_gradients(
    surfaces: &[AsphericSurface],
    bundle: &RayBundle,
    image_z: f32,
) -> (f32, Vec<SurfaceGrads>) {
    let mut loss = 0.0;
    let mut grads = Vec::with_capacity(surfaces.len());
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
        let traced = trace_bundle_dual(bundle, &lifted, image_z);
        let l = spot_loss_dual(&traced, bundle.ray_count());
        if tracked == 0 {
            loss = l.val;
        }
        grads.push(SurfaceGrads {
            height: l.dh,
            curvature: l.dc,
            coeff: l.da,
        });
    }
    (loss, grads)
}

/// The running lens simulation.
#[derive(Debug, Clone)]
pub struct LensSim {
    surfaces: Vec<AsphericSurface>,
    config: SimConfig,
    display_bundle: RayBundle,
    spot_bundle: RayBundle,
    opt_bundle: RayBundle,
    mode: Mode,
    iter: u32,
    loss: f32,
    min_loss: f32,
    rng: Pcg32,
}

impl LensSim {
    /// Create a simulation over a surface stack.
    ///
    /// Validates the configuration and every surface before anything runs.
    pub fn new(surfaces: Vec<AsphericSurface>, config: SimConfig) -> Result<Self, LensError> {
        if surfaces.is_empty() {
            return Err(LensError::EmptyStack);
        }
        config.validate()?;
        for surf in &surfaces {
            surf.validate()?;
        }
        let display_bundle = RayBundle::for_display(config.rays_per_slot, config.fov_slots)?;
        let spot_bundle = RayBundle::for_display(config.rays_per_slot, config.fov_slots)?;
        let opt_bundle = RayBundle::for_optimization(config.rays_per_slot, config.fov_slots)?;
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(LensSim {
            surfaces,
            config,
            display_bundle,
            spot_bundle,
            opt_bundle,
            mode: Mode::Interactive,
            iter: 0,
            loss: 0.0,
            min_loss: f32::INFINITY,
            rng: Pcg32::seed_from_u64(seed),
        })
    }

    /// The canonical four-surface demo stack: two biconvex elements with
    /// alternating index pairs, vertices from z = -10 upward in steps of 3.
    pub fn demo_stack() -> Vec<AsphericSurface> {
        let mut surfaces = Vec::with_capacity(4);
        let mut height = -10.0;
        for i in 0..4 {
            let (curvature, n_in, n_out) = if i % 2 == 0 {
                (0.01, 1.0, 1.5)
            } else {
                (-0.01, 1.5, 1.0)
            };
            surfaces.push(AsphericSurface {
                height,
                curvature,
                params: [0.0; crate::surface::MAX_ORDER],
                n_in,
                n_out,
            });
            height += 3.0;
        }
        surfaces
    }

    /// The surface stack.
    #[inline]
    pub fn surfaces(&self) -> &[AsphericSurface] {
        &self.surfaces
    }

    /// One surface by index.
    pub fn surface(&self, index: usize) -> Result<&AsphericSurface, LensError> {
        self.surfaces.get(index).ok_or(LensError::SurfaceIndex {
            index,
            len: self.surfaces.len(),
        })
    }

    /// Simulation configuration.
    #[inline]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current mode.
    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Loss of the most recent optimization iteration.
    #[inline]
    pub fn loss(&self) -> f32 {
        self.loss
    }

    /// Smallest loss observed so far (diagnostic; never gates updates).
    #[inline]
    pub fn min_loss(&self) -> f32 {
        self.min_loss
    }

    /// Iterations completed in the current/last optimization run.
    #[inline]
    pub fn iterations(&self) -> u32 {
        self.iter
    }

    fn ensure_interactive(&self) -> Result<(), LensError> {
        if self.mode == Mode::Optimizing {
            return Err(LensError::OptimizationRunning);
        }
        Ok(())
    }

    fn surface_mut(&mut self, index: usize) -> Result<&mut AsphericSurface, LensError> {
        let len = self.surfaces.len();
        self.surfaces
            .get_mut(index)
            .ok_or(LensError::SurfaceIndex { index, len })
    }

    /// Interactive edit: replace a surface's height.
    pub fn set_height(&mut self, index: usize, height: f32) -> Result<(), LensError> {
        self.ensure_interactive()?;
        self.surface_mut(index)?.set_height(height)
    }

    /// Interactive edit: replace a surface's curvature.
    pub fn set_curvature(&mut self, index: usize, curvature: f32) -> Result<(), LensError> {
        self.ensure_interactive()?;
        self.surface_mut(index)?.set_curvature(curvature)
    }

    /// Interactive edit: maximum field-of-view angle in degrees.
    pub fn set_fov(&mut self, fov_deg: f32) -> Result<(), LensError> {
        self.ensure_interactive()?;
        check_range("field of view", fov_deg, FOV_RANGE.0, FOV_RANGE.1)?;
        self.config.fov_deg = fov_deg;
        Ok(())
    }

    /// Interactive edit: learning-rate scale.
    pub fn set_lr_scale(&mut self, lr_scale: f32) -> Result<(), LensError> {
        self.ensure_interactive()?;
        check_range("lr scale", lr_scale, LR_RANGE.0, LR_RANGE.1)?;
        self.config.lr_scale = lr_scale;
        Ok(())
    }

    /// Interactive edit: iterations per optimization run.
    pub fn set_max_iters(&mut self, max_iters: u32) -> Result<(), LensError> {
        self.ensure_interactive()?;
        check_iters(max_iters)?;
        self.config.max_iters = max_iters;
        Ok(())
    }

    /// Switch to Optimizing mode and reset the iteration counter.
    pub fn start_optimization(&mut self) {
        self.mode = Mode::Optimizing;
        self.iter = 0;
    }

    /// Drop back to Interactive mode without waiting for the iteration cap.
    pub fn stop_optimization(&mut self) {
        self.mode = Mode::Interactive;
    }

    /// Advance the state machine by one iteration.
    ///
    /// In Optimizing mode: resample the optimization bundle, run the
    /// differentiated forward pass, apply one gradient-descent update per
    /// surface. Gradients for all surfaces are gathered before any update is
    /// applied.
    pub fn step(&mut self) -> StepOutcome {
        if self.mode != Mode::Optimizing {
            return StepOutcome::Idle;
        }
        if self.iter >= self.config.max_iters {
            self.mode = Mode::Interactive;
            log::info!(
                "optimization finished: {} iterations, min loss {:.6}",
                self.iter,
                self.min_loss
            );
            return StepOutcome::Finished {
                min_loss: self.min_loss,
            };
        }

        self.opt_bundle
            .sample_disk(self.config.bundle_radius, self.config.fov_deg, &mut self.rng);
        let (loss, grads) = loss_and_gradients(&self.surfaces, &self.opt_bundle, self.config.image_z);

        let lr = self.config.lr_scale / LR_DIVISOR;
        for (surf, grad) in self.surfaces.iter_mut().zip(&grads) {
            surf.height -= lr * HEIGHT_GRAD_SCALE * grad.height;
            surf.curvature -= lr * grad.curvature;
            surf.params[1] -= lr * COEFF_GRAD_SCALE * grad.coeff;
        }

        self.loss = loss;
        if loss < self.min_loss {
            self.min_loss = loss;
        }
        self.iter += 1;
        log::info!("iteration {}: loss {:.6}", self.iter, loss);
        StepOutcome::Iterated {
            iter: self.iter,
            loss,
        }
    }

    /// Uniform-fan trace for display: per propagation stage (each surface,
    /// then the image plane), (origin, endpoint) segments grouped by
    /// field-of-view slot.
    pub fn display_fan(&mut self) -> Vec<Vec<Vec<(Vec3, Vec3)>>> {
        self.display_bundle
            .sample_uniform(self.config.bundle_radius, self.config.fov_deg);
        let mut stages = Vec::with_capacity(self.surfaces.len() + 1);
        for surf in &self.surfaces {
            intersect_bundle(&mut self.display_bundle, surf);
            stages.push(self.display_bundle.segments());
            refract_bundle(&mut self.display_bundle, surf);
        }
        self.display_bundle.intersect_plane(self.config.image_z);
        stages.push(self.display_bundle.segments());
        stages
    }

    /// Random-bundle spot diagram on the image plane, grouped by slot.
    pub fn spot_diagram(&mut self) -> Vec<Vec<Vec2>> {
        self.spot_bundle
            .sample_disk(self.config.bundle_radius, self.config.fov_deg, &mut self.rng);
        propagate_bundle(&mut self.spot_bundle, &self.surfaces, self.config.image_z);
        self.spot_bundle.spot_points()
    }
}
