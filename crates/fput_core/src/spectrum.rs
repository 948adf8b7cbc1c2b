//! Modal decomposition of chain trajectories.
//!
//! Projects displacements and momenta onto the normalized sine basis used
//! by the single-mode builder, yielding per-mode energy series and the
//! Shannon entropy of their distribution over time. An equipartitioned
//! chain drifts towards maximal entropy; the FPU recurrence shows up as
//! the entropy falling back towards its initial value.

use anyhow::{bail, Result};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;
use std::f64::consts::PI;

use crate::integrate::Trajectory;

/// Angular frequencies `omega_k = 2 sin(pi*k/(2M))` of the sine modes
/// `sin(pi*k*n/M)` for a chain of `M` masses, `k = 1..M-1`.
pub fn mode_frequencies(masses: usize) -> Vec<f64> {
    let m = masses as f64;
    (1..masses)
        .map(|k| 2.0 * (PI * k as f64 / (2.0 * m)).sin())
        .collect()
}

/// Per-mode energy series of a trajectory.
#[derive(Debug, Clone, Serialize)]
pub struct ModalSpectrum {
    pub times: Vec<f64>,
    pub frequencies: Vec<f64>,
    /// `energies[k-1][i]`: energy of mode `k` at `times[i]`.
    pub energies: Vec<Vec<f64>>,
}

/// Projects the trajectory onto the sine modes and computes
/// `E_k = P_k^2/2 + omega_k^2 * Q_k^2 / 2` at every sample time.
///
/// The projection uses the same `sqrt(2/M) sin(pi*k*n/M)` normalization as
/// the single-mode builder, so exciting mode `k` puts all the energy in
/// row `k - 1` at `t = 0`.
pub fn modal_energies(trajectory: &Trajectory) -> Result<ModalSpectrum> {
    let masses = trajectory.masses();
    if masses < 2 {
        bail!("modal decomposition needs at least 2 masses, got {masses}");
    }
    let samples = trajectory.samples();
    let modes = masses - 1;
    let frequencies = mode_frequencies(masses);
    let norm = (2.0 / masses as f64).sqrt();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(2 * masses);
    let mut buffer = vec![Complex::new(0.0, 0.0); 2 * masses];

    let mut energies = vec![Vec::with_capacity(samples); modes];
    for i in 0..samples {
        let q = sine_transform(fft.as_ref(), &mut buffer, masses, |n| {
            trajectory.displacements[n][i]
        });
        let p = sine_transform(fft.as_ref(), &mut buffer, masses, |n| {
            trajectory.momenta[n][i]
        });
        for k in 1..=modes {
            let q_k = norm * q[k - 1];
            let p_k = norm * p[k - 1];
            let omega = frequencies[k - 1];
            energies[k - 1].push(0.5 * p_k * p_k + 0.5 * omega * omega * q_k * q_k);
        }
    }

    Ok(ModalSpectrum {
        times: trajectory.times.clone(),
        frequencies,
        energies,
    })
}

/// Shannon entropy of the normalized modal energy distribution at each
/// sample time: 0 when all energy sits in one mode (or the spectrum is
/// empty), `ln(modes)` when energy is equidistributed.
pub fn spectral_entropy(spectrum: &ModalSpectrum) -> Vec<f64> {
    (0..spectrum.times.len())
        .map(|i| {
            let total: f64 = spectrum.energies.iter().map(|row| row[i]).sum();
            if total <= 0.0 {
                return 0.0;
            }
            -spectrum
                .energies
                .iter()
                .map(|row| {
                    let share = row[i] / total;
                    if share > 0.0 {
                        share * share.ln()
                    } else {
                        0.0
                    }
                })
                .sum::<f64>()
        })
        .collect()
}

/// DST-I over the interior values: `S_k = sum_n v(n) sin(pi*k*n/M)` for
/// `k = 1..M-1`, computed as the FFT of the odd extension of length `2M`.
/// The transform of an odd sequence is purely imaginary, `Y_k = -2i S_k`.
fn sine_transform(
    fft: &dyn Fft<f64>,
    buffer: &mut [Complex<f64>],
    masses: usize,
    value: impl Fn(usize) -> f64,
) -> Vec<f64> {
    let len = buffer.len();
    for c in buffer.iter_mut() {
        *c = Complex::new(0.0, 0.0);
    }
    for n in 1..masses {
        let v = value(n);
        buffer[n] = Complex::new(v, 0.0);
        buffer[len - n] = Complex::new(-v, 0.0);
    }
    fft.process(buffer);
    (1..masses).map(|k| -0.5 * buffer[k].im).collect()
}

#[cfg(test)]
mod tests {
    use super::{modal_energies, mode_frequencies, spectral_entropy, ModalSpectrum};
    use crate::integrate::Trajectory;
    use crate::state::ChainState;
    use std::f64::consts::PI;

    fn single_sample(momenta: &[f64], displacements: &[f64]) -> Trajectory {
        Trajectory {
            times: vec![0.0],
            momenta: momenta.iter().map(|&p| vec![p]).collect(),
            displacements: displacements.iter().map(|&x| vec![x]).collect(),
        }
    }

    #[test]
    fn frequencies_follow_the_dispersion_relation() {
        let freqs = mode_frequencies(4);
        assert_eq!(freqs.len(), 3);
        assert!((freqs[0] - 2.0 * (PI / 8.0).sin()).abs() < 1e-12);
        assert!((freqs[2] - 2.0 * (3.0 * PI / 8.0).sin()).abs() < 1e-12);
    }

    #[test]
    fn fft_projection_matches_the_direct_sine_sum() {
        let momenta = [0.1, 0.0, -0.3, 0.5, 0.2];
        let displacements = [0.3, -0.7, 0.2, 0.9, -0.4];
        let trajectory = single_sample(&momenta, &displacements);
        let spectrum = modal_energies(&trajectory).unwrap();

        let masses = 5;
        let m = masses as f64;
        let norm = (2.0 / m).sqrt();
        for k in 1..masses {
            let mut q_k = 0.0;
            let mut p_k = 0.0;
            for n in 1..masses {
                let phase = (PI * k as f64 * n as f64 / m).sin();
                q_k += displacements[n] * phase;
                p_k += momenta[n] * phase;
            }
            q_k *= norm;
            p_k *= norm;
            let omega = 2.0 * (PI * k as f64 / (2.0 * m)).sin();
            let expected = 0.5 * p_k * p_k + 0.5 * omega * omega * q_k * q_k;
            assert!(
                (spectrum.energies[k - 1][0] - expected).abs() < 1e-10,
                "mode {k}: {} vs {expected}",
                spectrum.energies[k - 1][0]
            );
        }
    }

    #[test]
    fn single_mode_excitation_concentrates_modal_energy() {
        let state = ChainState::single_mode(6, 2).unwrap();
        let trajectory = single_sample(state.momenta(), state.displacements());
        let spectrum = modal_energies(&trajectory).unwrap();

        let omega = spectrum.frequencies[1];
        assert!((spectrum.energies[1][0] - 0.5 * omega * omega).abs() < 1e-10);
        for (k, row) in spectrum.energies.iter().enumerate() {
            if k != 1 {
                assert!(row[0].abs() < 1e-12, "mode {} leaked {}", k + 1, row[0]);
            }
        }

        let entropy = spectral_entropy(&spectrum);
        assert!(entropy[0].abs() < 1e-6);
    }

    #[test]
    fn equidistributed_energy_maximizes_entropy() {
        let spectrum = ModalSpectrum {
            times: vec![0.0],
            frequencies: vec![1.0, 1.0, 1.0],
            energies: vec![vec![0.25], vec![0.25], vec![0.25]],
        };
        let entropy = spectral_entropy(&spectrum);
        assert!((entropy[0] - 3.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn an_empty_spectrum_has_zero_entropy() {
        let spectrum = ModalSpectrum {
            times: vec![0.0],
            frequencies: vec![1.0, 1.0],
            energies: vec![vec![0.0], vec![0.0]],
        };
        assert_eq!(spectral_entropy(&spectrum)[0], 0.0);
    }

    #[test]
    fn a_lone_mass_has_no_modes_to_project_onto() {
        let trajectory = single_sample(&[1.0], &[0.5]);
        let err = modal_energies(&trajectory).expect_err("expected rejection");
        assert!(format!("{err}").contains("at least 2 masses"));
    }
}
