use serde::Serialize;

use crate::error::EngineError;
use crate::integrate::Trajectory;

/// Per-mass quasi-harmonic energy series.
///
/// The quantity tracked here is the harmonic part only:
/// `E_n = p_n^2/2 + ((x_{n+1}-x_n)^2 + (x_n-x_{n-1})^2)/2`, with the
/// missing wall neighbors at displacement zero. The anharmonic `alpha`
/// contribution is excluded on purpose, following the bookkeeping of the
/// original FPU study: near-conservation of the summed harmonic energy is
/// what makes the recurrence of the initially excited mode visible.
#[derive(Debug, Clone, Serialize)]
pub struct EnergySeries {
    pub times: Vec<f64>,
    /// `site_energies[n][i]`: energy of mass `n` at `times[i]`.
    pub site_energies: Vec<Vec<f64>>,
}

/// Computes the quasi-harmonic energy of every mass at every sample time.
///
/// Fails with `NumericAnomaly` if the trajectory contains non-finite
/// values; an overflowed state must not masquerade as an energy.
pub fn site_energies(trajectory: &Trajectory) -> Result<EnergySeries, EngineError> {
    let masses = trajectory.masses();
    let samples = trajectory.samples();
    let mut series = vec![Vec::with_capacity(samples); masses];
    for i in 0..samples {
        for n in 0..masses {
            let p = trajectory.momenta[n][i];
            let x = trajectory.displacements[n][i];
            let x_prev = if n == 0 {
                0.0
            } else {
                trajectory.displacements[n - 1][i]
            };
            let x_next = if n + 1 == masses {
                0.0
            } else {
                trajectory.displacements[n + 1][i]
            };
            let energy = 0.5 * p * p + 0.5 * ((x_next - x).powi(2) + (x - x_prev).powi(2));
            if !energy.is_finite() {
                return Err(EngineError::NumericAnomaly {
                    time: trajectory.times[i],
                });
            }
            series[n].push(energy);
        }
    }
    Ok(EnergySeries {
        times: trajectory.times.clone(),
        site_energies: series,
    })
}

/// Sum over all masses at each sample time: the conserved quantity of the
/// linear (`alpha = 0`) chain.
pub fn total_energy(series: &EnergySeries) -> Vec<f64> {
    (0..series.times.len())
        .map(|i| series.site_energies.iter().map(|row| row[i]).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{site_energies, total_energy};
    use crate::chain::ChainConfig;
    use crate::error::EngineError;
    use crate::integrate::{integrate, IntegrationSettings, Trajectory};
    use crate::state::ChainState;

    fn single_sample(momenta: &[f64], displacements: &[f64]) -> Trajectory {
        Trajectory {
            times: vec![0.0],
            momenta: momenta.iter().map(|&p| vec![p]).collect(),
            displacements: displacements.iter().map(|&x| vec![x]).collect(),
        }
    }

    #[test]
    fn energies_match_hand_computation() {
        let trajectory = single_sample(&[1.0, 0.0, 2.0], &[0.5, -1.0, 0.25]);
        let series = site_energies(&trajectory).unwrap();
        assert!((series.site_energies[0][0] - 1.75).abs() < 1e-12);
        assert!((series.site_energies[1][0] - 1.90625).abs() < 1e-12);
        assert!((series.site_energies[2][0] - 2.8125).abs() < 1e-12);
        assert!((total_energy(&series)[0] - 6.46875).abs() < 1e-12);
    }

    #[test]
    fn a_single_mass_sees_both_walls() {
        // E = p^2/2 + x^2, with no special-casing in the formula.
        let trajectory = single_sample(&[3.0], &[2.0]);
        let series = site_energies(&trajectory).unwrap();
        assert!((series.site_energies[0][0] - 8.5).abs() < 1e-12);
    }

    #[test]
    fn non_finite_trajectories_are_flagged() {
        let trajectory = single_sample(&[f64::NAN, 0.0], &[0.0, 1.0]);
        let err = site_energies(&trajectory).expect_err("expected anomaly");
        assert!(matches!(err, EngineError::NumericAnomaly { .. }));
    }

    /// Splitmix-style generator, good enough for scattering initial
    /// conditions without pulling in a dependency.
    fn pseudo_random(seed: &mut u64) -> f64 {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((*seed >> 32) as f64 / (1u64 << 31) as f64) - 1.0
    }

    #[test]
    fn the_linear_chain_conserves_total_energy() {
        let config = ChainConfig::new(3, 0.0, 2).unwrap();
        for seed in [7u64, 99, 4242] {
            let mut state = seed;
            let pairs: Vec<(f64, f64)> = (0..4)
                .map(|_| {
                    (
                        0.5 * pseudo_random(&mut state),
                        0.5 * pseudo_random(&mut state),
                    )
                })
                .collect();
            let initial = ChainState::from_pairs(4, &pairs).unwrap();
            let trajectory =
                integrate(&config, &initial, 20.0, 201, &IntegrationSettings::default())
                    .expect("integration should succeed");
            let series = site_energies(&trajectory).unwrap();
            let totals = total_energy(&series);
            let reference = totals[0];
            assert!(reference > 0.0);
            for (i, total) in totals.iter().enumerate() {
                assert!(
                    (total - reference).abs() < 5e-3 * reference,
                    "seed {seed}, sample {i}: {total} vs {reference}"
                );
            }
        }
    }
}
