use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::EngineError;

/// Momenta and displacements of every mass, one entry per mass.
///
/// This is the structured counterpart of the solver's flat interleaved
/// vector `[p0, x0, p1, x1, ...]`; conversion happens only at the
/// integrator boundary, so no other code needs the index-parity
/// convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    momenta: Vec<f64>,
    displacements: Vec<f64>,
}

impl ChainState {
    /// Builds a state from explicit per-mass momenta and displacements.
    pub fn new(momenta: Vec<f64>, displacements: Vec<f64>) -> Result<Self, EngineError> {
        if momenta.len() != displacements.len() {
            return Err(EngineError::InvalidConfiguration(format!(
                "momenta and displacements must have one entry per mass, got {} and {}",
                momenta.len(),
                displacements.len()
            )));
        }
        Ok(Self {
            momenta,
            displacements,
        })
    }

    /// Every mass starts with momentum `p` and displacement `x`.
    pub fn uniform(masses: usize, p: f64, x: f64) -> Self {
        Self {
            momenta: vec![p; masses],
            displacements: vec![x; masses],
        }
    }

    /// One `(momentum, displacement)` pair per mass, in chain order.
    pub fn from_pairs(masses: usize, pairs: &[(f64, f64)]) -> Result<Self, EngineError> {
        if pairs.len() != masses {
            return Err(EngineError::InvalidConfiguration(format!(
                "expected {} initial-condition pairs, got {}",
                masses,
                pairs.len()
            )));
        }
        Ok(Self {
            momenta: pairs.iter().map(|&(p, _)| p).collect(),
            displacements: pairs.iter().map(|&(_, x)| x).collect(),
        })
    }

    /// Zero momenta and displacements proportional to the `k`-th
    /// normal-mode shape of the linear fixed-fixed chain:
    /// `x_n = sqrt(2/M) * sin(pi*k*n/M)` with `M` the mass count.
    ///
    /// The normalization makes a modal decomposition of the resulting
    /// trajectory concentrate energy in mode `k`, which is the bridge
    /// between the linear mode shapes and the nonlinear simulation.
    pub fn single_mode(masses: usize, k: usize) -> Result<Self, EngineError> {
        if masses == 0 {
            return Err(EngineError::InvalidConfiguration(
                "mode excitation needs at least one mass".into(),
            ));
        }
        if k < 1 || k > masses {
            return Err(EngineError::InvalidConfiguration(format!(
                "mode index must lie in 1..={masses}, got {k}"
            )));
        }
        let m = masses as f64;
        let norm = (2.0 / m).sqrt();
        let displacements = (0..masses)
            .map(|n| norm * (PI * k as f64 * n as f64 / m).sin())
            .collect();
        Ok(Self {
            momenta: vec![0.0; masses],
            displacements,
        })
    }

    pub fn masses(&self) -> usize {
        self.momenta.len()
    }

    pub fn momenta(&self) -> &[f64] {
        &self.momenta
    }

    pub fn displacements(&self) -> &[f64] {
        &self.displacements
    }

    /// Interleaves into the solver layout `[p0, x0, p1, x1, ...]`.
    pub fn to_flat(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(2 * self.masses());
        for (p, x) in self.momenta.iter().zip(&self.displacements) {
            flat.push(*p);
            flat.push(*x);
        }
        flat
    }

    /// Parses the solver layout. The length must be even; index parity is
    /// what distinguishes momenta from displacements in the flat form.
    pub fn from_flat(flat: &[f64]) -> Result<Self, EngineError> {
        if flat.len() % 2 != 0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "interleaved state length must be even, got {}",
                flat.len()
            )));
        }
        Ok(Self {
            momenta: flat.iter().step_by(2).copied().collect(),
            displacements: flat.iter().skip(1).step_by(2).copied().collect(),
        })
    }
}
