use ndarray::{Array, ArrayBase, Data, Dimension, Zip};

use crate::{NetErr, Result};

/// Rectified linear unit, `max(x, 0)`.
pub fn relu<S, D>(x: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    x.mapv(|v| v.max(0.))
}

pub fn tanh<S, D>(x: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    x.mapv(f32::tanh)
}

/// Lets the gradient through wherever the activation was positive.
///
/// # Arguments
/// * `activation` - Either the input or the output of the forward `relu`.
/// * `d` - The gradient of the loss with respect to the output.
pub fn relu_backward<S, T, D>(
    activation: &ArrayBase<S, D>,
    d: &ArrayBase<T, D>,
) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    T: Data<Elem = f32>,
    D: Dimension,
{
    if activation.shape() != d.shape() {
        return Err(NetErr::SizeMismatch {
            what: "relu gradient",
            got: d.len(),
            expected: activation.len(),
        });
    }

    Ok(Zip::from(activation)
        .and(d)
        .map_collect(|&a, &d| if a > 0. { d } else { 0. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn relu_clamps_negatives() {
        let x = array![[-1., 0., 2.5]];
        assert_eq!(relu(&x), array![[0., 0., 2.5]]);
    }

    #[test]
    fn tanh_is_bounded() {
        let x = array![-100., 0., 100.];
        let y = tanh(&x);

        assert_eq!(y[1], 0.);
        assert!(y.iter().all(|v| v.abs() <= 1.));
    }

    #[test]
    fn relu_backward_masks() {
        let z = array![[-1., 0., 2.5], [3., -2., 1.]];
        let d = array![[10., 10., 10.], [1., 2., 3.]];

        let dz = relu_backward(&z, &d).unwrap();

        assert_eq!(dz, array![[0., 0., 10.], [1., 0., 3.]]);
    }
}
