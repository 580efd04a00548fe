#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard, PoisonError};

use alexnet::arch::layers::IMAGE_SIZE;
use ndarray::{Array2, Array4};
use ndarray_rand::RandomExt;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::Uniform;

/// A full network holds about 62M parameters, building several at once exhausts memory.
static HEAVY: Mutex<()> = Mutex::new(());

pub fn heavy() -> MutexGuard<'static, ()> {
    HEAVY.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn images(n: usize, seed: u64) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::random_using(
        (n, IMAGE_SIZE, IMAGE_SIZE, 3),
        Uniform::new(0., 255.).unwrap(),
        &mut rng,
    )
}

/// One-hot labels where row `i` belongs to `classes_of[i]`.
pub fn one_hot(classes: usize, classes_of: &[usize]) -> Array2<f32> {
    let mut labels = Array2::zeros((classes_of.len(), classes));
    for (i, &c) in classes_of.iter().enumerate() {
        labels[[i, c]] = 1.;
    }

    labels
}
