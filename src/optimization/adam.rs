use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Decay rates and the denominator guard of an Adam update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamHyper {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamHyper {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Adam over one flat parameter array.
///
/// Holds the running gradient mean and the running mean of its square for
/// every element, plus the amount of steps taken for the bias correction.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    hyper: AdamHyper,
    steps: i32,
    first_moment: Box<[f32]>,
    second_moment: Box<[f32]>,
}

impl Adam {
    /// Creates an optimizer for `len` parameters with zeroed moments.
    pub fn new(len: usize, learning_rate: f32, hyper: AdamHyper) -> Self {
        Self {
            learning_rate,
            hyper,
            steps: 0,
            first_moment: vec![0.; len].into(),
            second_moment: vec![0.; len].into(),
        }
    }

    pub fn with_defaults(len: usize, learning_rate: f32) -> Self {
        Self::new(len, learning_rate, AdamHyper::default())
    }

    /// Amount of updates applied so far.
    pub fn steps(&self) -> i32 {
        self.steps
    }

    /// Learning rate scaled by the bias correction of the current step.
    fn corrected_rate(&self) -> f32 {
        let AdamHyper { beta1, beta2, .. } = self.hyper;
        let first = 1. - beta1.powi(self.steps);
        let second = 1. - beta2.powi(self.steps);

        self.learning_rate * second.sqrt() / first
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        check_sizes(&self.first_moment, params)?;

        self.steps += 1;
        let rate = self.corrected_rate();
        let AdamHyper {
            beta1,
            beta2,
            epsilon,
        } = self.hyper;

        let moments = self.first_moment.iter_mut().zip(self.second_moment.iter_mut());
        for ((param, &g), (m, v)) in params.iter_mut().zip(grad).zip(moments) {
            *m = beta1 * *m + (1. - beta1) * g;
            *v = beta2 * *v + (1. - beta2) * g * g;
            *param -= rate * *m / (v.sqrt() + epsilon);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let mut optimizer = Adam::with_defaults(2, 0.0025);
        let mut params = [1., -1.];

        optimizer.update_params(&[3., -0.5], &mut params).unwrap();

        // after bias correction the first step is lr * sign(g)
        assert!((params[0] - (1. - 0.0025)).abs() < 1e-6);
        assert!((params[1] - (-1. + 0.0025)).abs() < 1e-6);
    }

    #[test]
    fn constant_gradient_keeps_a_constant_step() {
        let mut optimizer = Adam::with_defaults(1, 0.01);
        let mut params = [0.];

        for _ in 0..3 {
            optimizer.update_params(&[2.], &mut params).unwrap();
        }

        assert_eq!(optimizer.steps(), 3);
        assert!((params[0] + 0.03).abs() < 1e-5);
    }

    #[test]
    fn zero_gradient_keeps_params() {
        let mut optimizer = Adam::with_defaults(3, 0.1);
        let mut params = [0.5, 0.25, -2.];

        optimizer.update_params(&[0., 0., 0.], &mut params).unwrap();

        assert_eq!(params, [0.5, 0.25, -2.]);
    }

    #[test]
    fn size_mismatch() {
        let mut optimizer = Adam::with_defaults(3, 0.1);
        let mut params = [0.; 2];

        assert!(optimizer.update_params(&[0.; 2], &mut params).is_err());
        assert_eq!(optimizer.steps(), 0);
    }
}
