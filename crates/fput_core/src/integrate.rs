use serde::{Deserialize, Serialize};

use crate::chain::{ChainConfig, FpuChain};
use crate::error::EngineError;
use crate::solvers::{Bdf, BdfSettings, Rk4};
use crate::state::ChainState;
use crate::traits::Steppable;

/// Which time stepper drives the integration.
///
/// The chain is stiff for larger `alpha` or longer chains, so the implicit
/// `Bdf` method is the default and the only one suited to production runs;
/// `Rk4` is a fixed-step explicit alternative for cross-checking short,
/// non-stiff regimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Bdf,
    Rk4,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntegrationSettings {
    pub method: Method,
    pub solver: BdfSettings,
    /// Fixed substeps per sample interval when `method` is `Rk4`.
    pub rk4_substeps: usize,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            method: Method::Bdf,
            solver: BdfSettings::default(),
            rk4_substeps: 16,
        }
    }
}

/// Sampled solution of one integration run, split into per-mass channels.
///
/// All rows share the length of `times`; `momenta` and `displacements`
/// hold one row per mass. Read-only once produced.
#[derive(Debug, Clone, Serialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    /// `momenta[n][i]`: momentum of mass `n` at `times[i]`.
    pub momenta: Vec<Vec<f64>>,
    /// `displacements[n][i]`: displacement of mass `n` at `times[i]`.
    pub displacements: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn masses(&self) -> usize {
        self.momenta.len()
    }

    pub fn samples(&self) -> usize {
        self.times.len()
    }
}

/// Integrates the chain from `initial` over `[0, t_max]`, sampled on an
/// evenly spaced grid of `samples` points.
///
/// All configuration problems are reported as `InvalidConfiguration`
/// before any stepping begins. Solver non-convergence propagates as
/// `IntegrationFailure` and non-finite states as `NumericAnomaly`; a
/// truncated grid is never returned.
pub fn integrate(
    config: &ChainConfig,
    initial: &ChainState,
    t_max: f64,
    samples: usize,
    settings: &IntegrationSettings,
) -> Result<Trajectory, EngineError> {
    if !(t_max > 0.0) {
        return Err(EngineError::InvalidConfiguration(format!(
            "t_max must be positive, got {t_max}"
        )));
    }
    if samples < 2 {
        return Err(EngineError::InvalidConfiguration(format!(
            "at least 2 samples are needed to span the time grid, got {samples}"
        )));
    }
    if initial.masses() != config.masses() {
        return Err(EngineError::InvalidConfiguration(format!(
            "initial state describes {} masses, the chain has {}",
            initial.masses(),
            config.masses()
        )));
    }

    let system = FpuChain::new(*config);
    let times: Vec<f64> = (0..samples)
        .map(|i| t_max * i as f64 / (samples - 1) as f64)
        .collect();
    let y0 = initial.to_flat();

    let rows = match settings.method {
        Method::Bdf => Bdf::new(settings.solver).solve(&system, 0.0, &y0, &times)?,
        Method::Rk4 => rk4_rows(&system, &y0, &times, settings.rk4_substeps)?,
    };

    let masses = config.masses();
    let mut momenta = vec![Vec::with_capacity(samples); masses];
    let mut displacements = vec![Vec::with_capacity(samples); masses];
    for (row, &time) in rows.iter().zip(&times) {
        if row.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::NumericAnomaly { time });
        }
        for n in 0..masses {
            momenta[n].push(row[2 * n]);
            displacements[n].push(row[2 * n + 1]);
        }
    }

    Ok(Trajectory {
        times,
        momenta,
        displacements,
    })
}

fn rk4_rows(
    system: &FpuChain,
    y0: &[f64],
    times: &[f64],
    substeps: usize,
) -> Result<Vec<Vec<f64>>, EngineError> {
    let substeps = substeps.max(1);
    let mut stepper = Rk4::new(y0.len());
    let mut t = times[0];
    let mut y = y0.to_vec();
    let mut rows = Vec::with_capacity(times.len());
    rows.push(y.clone());
    for window in times.windows(2) {
        let dt = (window[1] - window[0]) / substeps as f64;
        for _ in 0..substeps {
            stepper.step(system, &mut t, &mut y, dt)?;
        }
        // Land exactly on the grid point instead of accumulating dt.
        t = window[1];
        rows.push(y.clone());
    }
    Ok(rows)
}
