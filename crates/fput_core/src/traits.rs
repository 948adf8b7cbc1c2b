use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

use crate::error::EngineError;

/// A trait for types that can be used as scalars in the chain dynamics.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A first-order ODE system `dy/dt = f(t, y)` over a flat state vector.
///
/// Implementations must be pure: `eval` may not mutate shared state, so a
/// single system value can drive several integration runs concurrently.
pub trait OdeSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// y: current state
    /// t: current time
    /// out: buffer for dy/dt, length `dimension()`
    fn eval(&self, t: T, y: &[T], out: &mut [T]);

    /// Writes the Jacobian `df_i/dy_j` in row-major order into `out`
    /// (length `dimension()^2`).
    ///
    /// The default is a forward-difference approximation; systems whose
    /// Jacobian has known structure should override it.
    fn jacobian(&self, t: T, y: &[T], out: &mut [T]) {
        let dim = self.dimension();
        let mut base = vec![T::zero(); dim];
        let mut bumped = vec![T::zero(); dim];
        let mut work = y.to_vec();
        self.eval(t, y, &mut base);
        let sqrt_eps = T::epsilon().sqrt();
        for j in 0..dim {
            let saved = work[j];
            let h = sqrt_eps * saved.abs().max(T::one());
            work[j] = saved + h;
            // Recompute the increment actually representable in T.
            let h_actual = work[j] - saved;
            self.eval(t, &work, &mut bumped);
            work[j] = saved;
            for i in 0..dim {
                out[i * dim + j] = (bumped[i] - base[i]) / h_actual;
            }
        }
    }
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    ///
    /// Fails with `NumericAnomaly` if the step produces a non-finite state.
    fn step(
        &mut self,
        system: &impl OdeSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), EngineError>;
}
