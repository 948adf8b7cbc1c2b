use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::traits::{OdeSystem, Scalar};

/// Immutable parameters of an FPU(T) chain.
///
/// The chain has `n + 1` unit masses, indices `0..=n`, coupled to their
/// neighbors by unit springs and to immovable walls at both ends. Mass and
/// spring constant are normalized to 1 throughout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChainConfig {
    n: usize,
    alpha: f64,
    exponent: i32,
}

impl ChainConfig {
    /// `n` is the index of the last mass, `alpha` the perturbation
    /// coefficient, `exponent` the nonlinearity exponent (2 for the
    /// quadratic problem, 3 for the cubic one).
    pub fn new(n: usize, alpha: f64, exponent: i32) -> Result<Self, EngineError> {
        if n < 1 {
            return Err(EngineError::InvalidConfiguration(format!(
                "a chain needs at least 2 masses, got {}",
                n + 1
            )));
        }
        if exponent < 1 {
            return Err(EngineError::InvalidConfiguration(format!(
                "nonlinearity exponent must be a positive integer, got {exponent}"
            )));
        }
        Ok(Self { n, alpha, exponent })
    }

    /// Index of the last mass.
    pub fn last_index(&self) -> usize {
        self.n
    }

    pub fn masses(&self) -> usize {
        self.n + 1
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// Dimension of the interleaved state vector.
    pub fn dimension(&self) -> usize {
        2 * (self.n + 1)
    }
}

/// Equations of motion of the anharmonic mass-spring chain with fixed
/// (Dirichlet) walls.
///
/// The state layout is the solver's flat interleaved convention: `y[2n]`
/// holds the momentum of mass `n`, `y[2n + 1]` its displacement. The
/// missing neighbors of the boundary masses are clamped to displacement
/// zero, so the same force expression covers every mass.
pub struct FpuChain {
    config: ChainConfig,
}

impl FpuChain {
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

impl<T: Scalar> OdeSystem<T> for FpuChain {
    fn dimension(&self) -> usize {
        self.config.dimension()
    }

    fn eval(&self, _t: T, y: &[T], out: &mut [T]) {
        let last = self.config.n;
        let alpha = T::from_f64(self.config.alpha).unwrap();
        let p = self.config.exponent;
        for n in 0..=last {
            let x = y[2 * n + 1];
            let x_prev = if n == 0 { T::zero() } else { y[2 * n - 1] };
            let x_next = if n == last { T::zero() } else { y[2 * n + 3] };
            let right = x_next - x;
            let left = x - x_prev;
            out[2 * n] = right - left + alpha * (right.powi(p) - left.powi(p));
            out[2 * n + 1] = y[2 * n];
        }
    }

    /// Analytic Jacobian of the force law. Each momentum row couples only
    /// to the three nearest displacements, each displacement row to its own
    /// momentum, so the matrix is banded in the interleaved ordering.
    fn jacobian(&self, _t: T, y: &[T], out: &mut [T]) {
        let dim = self.config.dimension();
        let last = self.config.n;
        let alpha = T::from_f64(self.config.alpha).unwrap();
        let p = self.config.exponent;
        let pf = T::from_i32(p).unwrap();
        for v in out.iter_mut() {
            *v = T::zero();
        }
        for n in 0..=last {
            let x = y[2 * n + 1];
            let x_prev = if n == 0 { T::zero() } else { y[2 * n - 1] };
            let x_next = if n == last { T::zero() } else { y[2 * n + 3] };
            let d_right = T::one() + alpha * pf * (x_next - x).powi(p - 1);
            let d_left = T::one() + alpha * pf * (x - x_prev).powi(p - 1);
            let row = 2 * n * dim;
            out[row + 2 * n + 1] = -(d_right + d_left);
            if n > 0 {
                out[row + 2 * n - 1] = d_left;
            }
            if n < last {
                out[row + 2 * n + 3] = d_right;
            }
            out[(2 * n + 1) * dim + 2 * n] = T::one();
        }
    }
}
