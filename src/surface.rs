//! Aspherical refracting surface
//!
//! One [`AsphericSurface`] is a rotationally symmetric interface: a base
//! conic (spherical for small apertures) plus an even polynomial correction
//! in `r²`, offset axially by `height`. The surface owns its refractive
//! index pair and is the unit the optimizer mutates.
//!
//! The polynomial correction starts at the `r⁴` term: `params[0]` is
//! reserved and never enters the sag or its derivative, and only `params[1]`
//! is optimized. Both asymmetries are part of the surface contract.
//!
//! Author: Moroya Sakamoto

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{check_range, LensError};

/// Number of shape coefficient slots per surface.
pub const MAX_ORDER: usize = 10;

/// Documented range for `height`.
pub const HEIGHT_RANGE: (f32, f32) = (-20.0, 10.0);

/// Documented range for `curvature`.
pub const CURVATURE_RANGE: (f32, f32) = (-0.1, 0.1);

/// Floor for the base-conic radicand `1 - curvature²·r²`.
///
/// A ray far enough off-axis that the radicand would go non-positive hits a
/// numerically degenerate region of the conic; the floor keeps the sag
/// finite there instead of producing NaN.
pub(crate) const RADICAND_FLOOR: f32 = 1e-6;

/// A rotationally symmetric aspherical refracting interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsphericSurface {
    /// Axial offset of the surface vertex
    pub(crate) height: f32,
    /// Inverse radius of the base conic
    pub(crate) curvature: f32,
    /// Shape coefficients; `params[k-1]` scales `r^(2k)` for k in 2..=10
    #[serde(default = "zero_params")]
    pub(crate) params: [f32; MAX_ORDER],
    /// Refractive index on the incident side
    pub n_in: f32,
    /// Refractive index on the transmitted side
    pub n_out: f32,
}

fn zero_params() -> [f32; MAX_ORDER] {
    [0.0; MAX_ORDER]
}

impl AsphericSurface {
    /// Create a surface with zeroed shape coefficients.
    ///
    /// `height` and `curvature` are validated against their documented
    /// ranges.
    pub fn new(height: f32, curvature: f32, n_in: f32, n_out: f32) -> Result<Self, LensError> {
        let surface = AsphericSurface {
            height,
            curvature,
            params: zero_params(),
            n_in,
            n_out,
        };
        surface.validate()?;
        Ok(surface)
    }

    /// Range-check the surface parameters.
    ///
    /// Also applied to deserialized prescriptions before a forward pass.
    pub fn validate(&self) -> Result<(), LensError> {
        check_range("height", self.height, HEIGHT_RANGE.0, HEIGHT_RANGE.1)?;
        check_range(
            "curvature",
            self.curvature,
            CURVATURE_RANGE.0,
            CURVATURE_RANGE.1,
        )?;
        Ok(())
    }

    /// Axial offset of the surface vertex.
    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Inverse radius of the base conic.
    #[inline]
    pub fn curvature(&self) -> f32 {
        self.curvature
    }

    /// Shape coefficients.
    #[inline]
    pub fn params(&self) -> &[f32; MAX_ORDER] {
        &self.params
    }

    /// Replace `height`, validated against its documented range.
    pub fn set_height(&mut self, height: f32) -> Result<(), LensError> {
        check_range("height", height, HEIGHT_RANGE.0, HEIGHT_RANGE.1)?;
        self.height = height;
        Ok(())
    }

    /// Replace `curvature`, validated against its documented range.
    pub fn set_curvature(&mut self, curvature: f32) -> Result<(), LensError> {
        check_range(
            "curvature",
            curvature,
            CURVATURE_RANGE.0,
            CURVATURE_RANGE.1,
        )?;
        self.curvature = curvature;
        Ok(())
    }

    /// Sag: axial height of the surface at lateral position (x, y).
    ///
    /// Base conic `c·r² / (1 + sqrt(1 - c²·r²))` plus the even polynomial
    /// correction, offset by `height`.
    #[inline]
    pub fn sag(&self, x: f32, y: f32) -> f32 {
        let r2 = x * x + y * y;
        let k = self.curvature * self.curvature * r2;
        let a = (1.0 - k).max(RADICAND_FLOOR).sqrt();
        let mut z = self.curvature * r2 / (1.0 + a) + self.height;

        let mut r2k = r2 * r2;
        for order in 2..=MAX_ORDER {
            z += r2k * self.params[order - 1];
            r2k *= r2;
        }
        z
    }

    /// Derivative of the sag with respect to one lateral coordinate,
    /// treating the profile as univariate along that axis.
    #[inline]
    pub fn tangent(&self, u: f32) -> f32 {
        let k = self.curvature * self.curvature * u * u;
        let a = (1.0 - k).max(RADICAND_FLOOR).sqrt();
        let mut g = 2.0 * self.curvature * u * (1.0 + a - 0.5 * k) / (a * (1.0 + a) * (1.0 + a));

        let mut upow = u * u * u;
        for order in 2..=MAX_ORDER {
            g += (2 * order) as f32 * upow * self.params[order - 1];
            upow *= u * u;
        }
        g
    }

    /// Unit surface normal at (x, y), oriented toward -z.
    ///
    /// Built from two independent univariate tangents,
    /// `normalize((tangent(x), tangent(y), -1))`. This is the surface's
    /// normal-estimation policy for separable rotationally symmetric
    /// profiles sampled near the axis, not a general bivariate gradient.
    #[inline]
    pub fn normal(&self, x: f32, y: f32) -> Vec3 {
        Vec3::new(self.tangent(x), self.tangent(y), -1.0).normalize()
    }

    /// Cross-section profile for display: `count` evenly spaced (u, sag)
    /// samples along one lateral axis over `[-width, width]`.
    pub fn sample_profile(&self, width: f32, count: usize) -> Vec<Vec2> {
        let step = if count > 1 {
            2.0 * width / (count - 1) as f32
        } else {
            0.0
        };
        (0..count)
            .map(|i| {
                let u = step * i as f32 - width;
                Vec2::new(u, self.sag(u, 0.0))
            })
            .collect()
    }
}
