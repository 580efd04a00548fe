use ndarray::{ArrayD, IxDyn};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::RandErr;

/// A normal distribution whose samples farther than two standard deviations from the mean
/// are drawn again.
#[derive(Debug, Clone, Copy)]
pub struct TruncatedNormal {
    normal: Normal<f32>,
    mean: f32,
    bound: f32,
}

impl TruncatedNormal {
    /// Creates a new `TruncatedNormal` distribution.
    ///
    /// # Arguments
    /// * `mean` - The mean of the distribution.
    /// * `std_dev` - The standard deviation of the untruncated distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite or not positive.
    pub fn new(mean: f32, std_dev: f32) -> Result<Self, RandErr> {
        if !(std_dev > 0.) {
            return Err(RandErr::new(format!(
                "standard deviation must be positive, got {std_dev}"
            )));
        }

        Ok(Self {
            normal: Normal::new(mean, std_dev)?,
            mean,
            bound: 2. * std_dev,
        })
    }

    /// Samples a whole array of the given shape.
    pub fn array<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> ArrayD<f32> {
        ArrayD::random_using(IxDyn(shape), *self, rng)
    }
}

impl Distribution<f32> for TruncatedNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        loop {
            let x = self.normal.sample(rng);
            if (x - self.mean).abs() <= self.bound {
                return x;
            }
        }
    }
}
