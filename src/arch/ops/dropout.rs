use ndarray::{Array, ArrayBase, Data, Dimension};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Bernoulli;

use crate::{NetErr, Result, initialization::RandErr};

/// Randomly zeroes activations while training and scales the survivors by `1 / keep_prob`.
#[derive(Debug, Clone, Copy)]
pub struct Dropout {
    keep_prob: f32,
    keep: Bernoulli,
}

impl Dropout {
    /// Creates a new `Dropout`.
    ///
    /// # Arguments
    /// * `keep_prob` - The probability of an activation being kept, in `(0, 1]`.
    ///
    /// # Returns
    /// An error if `keep_prob` is out of range.
    pub fn new(keep_prob: f32) -> std::result::Result<Self, RandErr> {
        if !(keep_prob > 0. && keep_prob <= 1.) {
            return Err(RandErr::new(format!(
                "keep probability must be in (0, 1], got {keep_prob}"
            )));
        }

        Ok(Self {
            keep_prob,
            keep: Bernoulli::new(keep_prob as f64)?,
        })
    }

    pub fn keep_prob(&self) -> f32 {
        self.keep_prob
    }

    /// Applies dropout to `x`.
    ///
    /// # Arguments
    /// * `x` - The activations.
    /// * `training` - When false the activations are returned untouched.
    /// * `rng` - The source of randomness for the mask.
    ///
    /// # Returns
    /// The output and, when training, the scaled mask that produced it.
    pub fn forward<S, D, R>(
        &self,
        x: &ArrayBase<S, D>,
        training: bool,
        rng: &mut R,
    ) -> (Array<f32, D>, Option<Array<f32, D>>)
    where
        S: Data<Elem = f32>,
        D: Dimension,
        R: Rng + ?Sized,
    {
        if !training {
            return (x.to_owned(), None);
        }

        let scale = 1. / self.keep_prob;
        let mask = Array::<bool, D>::random_using(x.raw_dim(), self.keep, rng)
            .mapv(|kept| if kept { scale } else { 0. });

        (x * &mask, Some(mask))
    }

    /// Back propagates through a training `forward` using its mask.
    pub fn backward<S, T, D>(mask: &ArrayBase<S, D>, d: &ArrayBase<T, D>) -> Result<Array<f32, D>>
    where
        S: Data<Elem = f32>,
        T: Data<Elem = f32>,
        D: Dimension,
    {
        if mask.shape() != d.shape() {
            return Err(NetErr::SizeMismatch {
                what: "dropout gradient",
                got: d.len(),
                expected: mask.len(),
            });
        }

        Ok(mask * d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn identity_when_not_training() {
        let mut rng = StdRng::seed_from_u64(0);
        let dropout = Dropout::new(0.5).unwrap();
        let x = Array2::from_elem((4, 8), 3.);

        let (y, mask) = dropout.forward(&x, false, &mut rng);

        assert_eq!(y, x);
        assert!(mask.is_none());
    }

    #[test]
    fn survivors_are_scaled() {
        let mut rng = StdRng::seed_from_u64(1);
        let dropout = Dropout::new(0.5).unwrap();
        let x = Array2::from_elem((32, 32), 1.);

        let (y, mask) = dropout.forward(&x, true, &mut rng);
        let mask = mask.unwrap();

        assert!(y.iter().all(|&v| v == 0. || v == 2.));
        assert_eq!(y, mask);

        let kept = y.iter().filter(|&&v| v > 0.).count();
        assert!(kept > 400 && kept < 624, "kept {kept} of 1024");
    }

    #[test]
    fn backward_uses_the_mask() {
        let mask = ndarray::array![[2., 0.], [0., 2.]];
        let d = ndarray::array![[1., 1.], [3., 4.]];

        let dx = Dropout::backward(&mask, &d).unwrap();

        assert_eq!(dx, ndarray::array![[2., 0.], [0., 8.]]);
    }

    #[test]
    fn invalid_keep_prob() {
        assert!(Dropout::new(0.).is_err());
        assert!(Dropout::new(1.5).is_err());
        assert!(Dropout::new(1.).is_ok());
    }
}
