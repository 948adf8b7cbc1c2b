//! Core simulation engine for the Fermi-Pasta-Ulam-Tsingou problem: a
//! finite chain of unit masses coupled by weakly nonlinear springs between
//! fixed walls, evolved in time and analyzed for energy exchange between
//! its vibrational modes.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `OdeSystem` (vector
//!   fields with Jacobians), `Steppable` (single-step solvers).
//! - **Chain**: the boundary-aware equations of motion and their banded
//!   Jacobian.
//! - **State**: the momenta/displacements state model and the
//!   initial-condition builders, including single-mode excitation.
//! - **Solvers**: fixed-step RK4 and the adaptive implicit BDF integrator
//!   the stiff chain requires.
//! - **Integrate**: the sampling driver producing per-mass trajectories.
//! - **Energy / Spectrum**: quasi-harmonic site energies and modal energy
//!   spectra for observing the recurrence phenomenon.
//!
//! The engine does no I/O and holds no global state; every run owns its
//! inputs and outputs, so independent experiments can execute in parallel.

pub mod chain;
pub mod energy;
pub mod error;
pub mod integrate;
pub mod solvers;
pub mod spectrum;
pub mod state;
pub mod traits;
