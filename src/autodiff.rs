//! Forward-mode automatic differentiation over surface parameters
//!
//! Provides [`Dual3`], a dual number carrying a value and its partial
//! derivatives with respect to the three optimized parameters of one
//! tracked surface: `height`, `curvature`, and the first active shape
//! coefficient (`params[1]`). All arithmetic propagates the partials through
//! the chain rule, so a whole forward trace (including every iteration of
//! the intersection solver) evaluated in `Dual3` arithmetic yields exact
//! parameter gradients with no finite-difference approximation.
//!
//! [`DualSurface`] lifts a surface's parameters into `Dual3`: a *tracked*
//! lift seeds the three partials, a *frozen* lift is all constants. Dual
//! sag/tangent/normal mirror the scalar evaluators in
//! [`surface`](crate::surface) operation for operation, so the two backends
//! agree on values.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;

use crate::surface::{AsphericSurface, MAX_ORDER, RADICAND_FLOOR};

// ── Dual3 ────────────────────────────────────────────────────

/// Dual number: value + partials (∂/∂height, ∂/∂curvature, ∂/∂coeff) with
/// respect to the tracked surface's parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual3 {
    /// Function value.
    pub val: f32,
    /// Partial derivative with respect to the tracked `height`.
    pub dh: f32,
    /// Partial derivative with respect to the tracked `curvature`.
    pub dc: f32,
    /// Partial derivative with respect to the tracked `params[1]`.
    pub da: f32,
}

impl Dual3 {
    /// Constant (all partials = 0).
    #[inline(always)]
    pub fn constant(val: f32) -> Self {
        Self {
            val,
            dh: 0.0,
            dc: 0.0,
            da: 0.0,
        }
    }

    /// Extract the partials as a (dh, dc, da) triple.
    #[inline(always)]
    pub fn grad(self) -> (f32, f32, f32) {
        (self.dh, self.dc, self.da)
    }

    /// Square root with a guarded derivative at zero.
    #[inline(always)]
    pub fn sqrt(self) -> Self {
        let r = self.val.max(0.0).sqrt();
        if r > 1e-10 {
            let inv2r = 0.5 / r;
            Self {
                val: r,
                dh: self.dh * inv2r,
                dc: self.dc * inv2r,
                da: self.da * inv2r,
            }
        } else {
            Self {
                val: r,
                dh: 0.0,
                dc: 0.0,
                da: 0.0,
            }
        }
    }

    /// Maximum of two dual numbers (derivative follows the winner).
    #[inline(always)]
    pub fn max(self, other: Self) -> Self {
        if self.val >= other.val {
            self
        } else {
            other
        }
    }
}

impl std::ops::Add for Dual3 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self {
            val: self.val + rhs.val,
            dh: self.dh + rhs.dh,
            dc: self.dc + rhs.dc,
            da: self.da + rhs.da,
        }
    }
}

impl std::ops::Sub for Dual3 {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self {
            val: self.val - rhs.val,
            dh: self.dh - rhs.dh,
            dc: self.dc - rhs.dc,
            da: self.da - rhs.da,
        }
    }
}

impl std::ops::Mul for Dual3 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        Self {
            val: self.val * rhs.val,
            dh: self.val * rhs.dh + self.dh * rhs.val,
            dc: self.val * rhs.dc + self.dc * rhs.val,
            da: self.val * rhs.da + self.da * rhs.val,
        }
    }
}

impl std::ops::Mul<f32> for Dual3 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: f32) -> Self {
        Self {
            val: self.val * rhs,
            dh: self.dh * rhs,
            dc: self.dc * rhs,
            da: self.da * rhs,
        }
    }
}

impl std::ops::Div for Dual3 {
    type Output = Self;
    #[inline(always)]
    fn div(self, rhs: Self) -> Self {
        let val = self.val / rhs.val;
        let inv2 = 1.0 / (rhs.val * rhs.val);
        Self {
            val,
            dh: (self.dh * rhs.val - self.val * rhs.dh) * inv2,
            dc: (self.dc * rhs.val - self.val * rhs.dc) * inv2,
            da: (self.da * rhs.val - self.val * rhs.da) * inv2,
        }
    }
}

impl std::ops::Neg for Dual3 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self {
            val: -self.val,
            dh: -self.dh,
            dc: -self.dc,
            da: -self.da,
        }
    }
}

// ── DualVec3 ─────────────────────────────────────────────────

/// 3-vector of [`Dual3`] components.
#[derive(Debug, Clone, Copy)]
pub struct DualVec3 {
    /// X component.
    pub x: Dual3,
    /// Y component.
    pub y: Dual3,
    /// Z component.
    pub z: Dual3,
}

impl DualVec3 {
    /// Lift a constant vector (all partials = 0).
    #[inline(always)]
    pub fn constant(v: Vec3) -> Self {
        Self {
            x: Dual3::constant(v.x),
            y: Dual3::constant(v.y),
            z: Dual3::constant(v.z),
        }
    }

    /// Value part as a plain vector.
    #[inline(always)]
    pub fn value(self) -> Vec3 {
        Vec3::new(self.x.val, self.y.val, self.z.val)
    }

    /// Dot product.
    #[inline(always)]
    pub fn dot(self, rhs: Self) -> Dual3 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Euclidean length.
    #[inline(always)]
    pub fn length(self) -> Dual3 {
        self.dot(self).sqrt()
    }

    /// Component-wise division by a dual scalar.
    #[inline(always)]
    pub fn div_scalar(self, rhs: Dual3) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
            z: self.z / rhs,
        }
    }
}

impl std::ops::Add for DualVec3 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl std::ops::Sub for DualVec3 {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl std::ops::Mul<Dual3> for DualVec3 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: Dual3) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
            z: self.z * rhs,
        }
    }
}

impl std::ops::Mul<f32> for DualVec3 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
            z: self.z * rhs,
        }
    }
}

// ── Dual surface evaluation ──────────────────────────────────

/// A surface with its parameters lifted into [`Dual3`].
///
/// Built once per (surface, pass) and shared across the ray batch.
#[derive(Debug, Clone)]
pub struct DualSurface {
    /// Axial offset, possibly seeded with ∂/∂height = 1.
    pub height: Dual3,
    /// Base-conic curvature, possibly seeded with ∂/∂curvature = 1.
    pub curvature: Dual3,
    /// Shape coefficients; `params[1]` possibly seeded with ∂/∂coeff = 1.
    pub params: [Dual3; MAX_ORDER],
    /// Refractive index on the incident side.
    pub n_in: f32,
    /// Refractive index on the transmitted side.
    pub n_out: f32,
}

impl DualSurface {
    /// Lift with this surface's optimized parameters seeded as variables.
    pub fn tracked(surface: &AsphericSurface) -> Self {
        let mut lifted = Self::frozen(surface);
        lifted.height.dh = 1.0;
        lifted.curvature.dc = 1.0;
        lifted.params[1].da = 1.0;
        lifted
    }

    /// Lift with every parameter constant.
    pub fn frozen(surface: &AsphericSurface) -> Self {
        let mut params = [Dual3::constant(0.0); MAX_ORDER];
        for (lifted, &p) in params.iter_mut().zip(surface.params()) {
            *lifted = Dual3::constant(p);
        }
        DualSurface {
            height: Dual3::constant(surface.height()),
            curvature: Dual3::constant(surface.curvature()),
            params,
            n_in: surface.n_in,
            n_out: surface.n_out,
        }
    }

    /// Dual sag; mirrors [`AsphericSurface::sag`] operation for operation.
    #[inline]
    pub fn sag(&self, x: Dual3, y: Dual3) -> Dual3 {
        let r2 = x * x + y * y;
        let k = self.curvature * self.curvature * r2;
        let a = (Dual3::constant(1.0) - k)
            .max(Dual3::constant(RADICAND_FLOOR))
            .sqrt();
        let mut z = self.curvature * r2 / (Dual3::constant(1.0) + a) + self.height;

        let mut r2k = r2 * r2;
        for order in 2..=MAX_ORDER {
            z = z + r2k * self.params[order - 1];
            r2k = r2k * r2;
        }
        z
    }

    /// Dual univariate tangent; mirrors [`AsphericSurface::tangent`].
    #[inline]
    pub fn tangent(&self, u: Dual3) -> Dual3 {
        let k = self.curvature * self.curvature * u * u;
        let a = (Dual3::constant(1.0) - k)
            .max(Dual3::constant(RADICAND_FLOOR))
            .sqrt();
        let one_plus = Dual3::constant(1.0) + a;
        let mut g = self.curvature * u * 2.0 * (Dual3::constant(1.0) + a - k * 0.5)
            / (a * one_plus * one_plus);

        let mut upow = u * u * u;
        for order in 2..=MAX_ORDER {
            g = g + upow * self.params[order - 1] * (2 * order) as f32;
            upow = upow * u * u;
        }
        g
    }

    /// Dual unit normal; mirrors [`AsphericSurface::normal`].
    #[inline]
    pub fn normal(&self, x: Dual3, y: Dual3) -> DualVec3 {
        let n = DualVec3 {
            x: self.tangent(x),
            y: self.tangent(y),
            z: Dual3::constant(-1.0),
        };
        n.div_scalar(n.length())
    }
}
