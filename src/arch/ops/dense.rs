use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::{NetErr, Result};

/// The gradients of a fully connected layer.
#[derive(Debug)]
pub struct DenseGrads {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub input: Array2<f32>,
}

fn check(x: ArrayView2<f32>, w: ArrayView2<f32>) -> Result<()> {
    if x.ncols() != w.nrows() {
        return Err(NetErr::SizeMismatch {
            what: "fully connected input",
            got: x.ncols(),
            expected: w.nrows(),
        });
    }

    Ok(())
}

/// Computes `x · w + b` for a batch of flattened rows.
///
/// # Arguments
/// * `x` - The input, `(N, in)`.
/// * `w` - The weights, `(in, out)`.
/// * `b` - The biases, `(out)`.
pub fn dense(x: ArrayView2<f32>, w: ArrayView2<f32>, b: ArrayView1<f32>) -> Result<Array2<f32>> {
    check(x, w)?;

    if b.len() != w.ncols() {
        return Err(NetErr::SizeMismatch {
            what: "fully connected biases",
            got: b.len(),
            expected: w.ncols(),
        });
    }

    let mut z = x.dot(&w);
    z += &b;
    Ok(z)
}

/// Back propagates through `dense` given the gradient `d` of its output.
pub fn dense_backward(
    x: ArrayView2<f32>,
    w: ArrayView2<f32>,
    d: ArrayView2<f32>,
) -> Result<DenseGrads> {
    check(x, w)?;

    if d.dim() != (x.nrows(), w.ncols()) {
        return Err(NetErr::SizeMismatch {
            what: "fully connected output gradient",
            got: d.len(),
            expected: x.nrows() * w.ncols(),
        });
    }

    Ok(DenseGrads {
        weights: x.t().dot(&d),
        biases: d.sum_axis(Axis(0)),
        input: d.dot(&w.t()),
    })
}
