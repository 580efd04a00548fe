use ndarray::{Array4, ArrayView4, Zip};

use super::{Padding, Window};
use crate::{NetErr, Result};

/// The output of a max pooling together with where each maximum came from.
#[derive(Debug, Clone)]
pub struct MaxPool {
    pub output: Array4<f32>,
    /// Flat `iy * W + ix` position of every output's maximum in the input.
    pub argmax: Array4<usize>,
}

/// Takes the maximum of every `k x k` window, padded cells never win.
///
/// # Arguments
/// * `x` - The input batch, `(N, H, W, C)`.
/// * `k` - The window size.
/// * `stride` - The step between windows.
/// * `padding` - The border handling.
///
/// # Returns
/// The pooled batch and the argmax positions needed to back propagate.
pub fn max_pool(x: ArrayView4<f32>, k: usize, stride: usize, padding: Padding) -> Result<MaxPool> {
    let (n, h, w, c) = x.dim();
    let win = Window::new((h, w), (k, k), stride, padding)?;

    let argmax = Array4::from_shape_fn((n, win.out_h, win.out_w, c), |(b, oy, ox, ch)| {
        let mut best: Option<(usize, f32)> = None;

        for ky in 0..k {
            let Some(iy) = win.input_row(oy, ky) else {
                continue;
            };

            for kx in 0..k {
                let Some(ix) = win.input_col(ox, kx) else {
                    continue;
                };

                let v = x[[b, iy, ix, ch]];
                if best.is_none_or(|(_, max)| v > max) {
                    best = Some((iy * w + ix, v));
                }
            }
        }

        best.map_or(0, |(idx, _)| idx)
    });

    let output = Array4::from_shape_fn(argmax.raw_dim(), |(b, oy, ox, ch)| {
        let idx = argmax[[b, oy, ox, ch]];
        x[[b, idx / w, idx % w, ch]]
    });

    Ok(MaxPool { output, argmax })
}

/// Routes each output gradient back to the input cell that held the maximum.
///
/// # Arguments
/// * `argmax` - The positions recorded by `max_pool`.
/// * `d` - The gradient of the loss with respect to the pooled output.
/// * `input_dim` - The shape of the pooled input.
pub fn max_pool_backward(
    argmax: &Array4<usize>,
    d: ArrayView4<f32>,
    input_dim: (usize, usize, usize, usize),
) -> Result<Array4<f32>> {
    if argmax.dim() != d.dim() {
        return Err(NetErr::SizeMismatch {
            what: "max pool output gradient",
            got: d.len(),
            expected: argmax.len(),
        });
    }

    let w = input_dim.2;
    let mut dx = Array4::zeros(input_dim);

    Zip::indexed(argmax)
        .and(d)
        .for_each(|(b, _, _, ch), &idx, &g| dx[[b, idx / w, idx % w, ch]] += g);

    Ok(dx)
}

/// Averages every `k x k` window over the cells that fall inside the input.
pub fn avg_pool(
    x: ArrayView4<f32>,
    k: usize,
    stride: usize,
    padding: Padding,
) -> Result<Array4<f32>> {
    let (n, h, w, c) = x.dim();
    let win = Window::new((h, w), (k, k), stride, padding)?;

    Ok(Array4::from_shape_fn(
        (n, win.out_h, win.out_w, c),
        |(b, oy, ox, ch)| {
            let mut sum = 0.;
            let mut count = 0;

            for ky in 0..k {
                let Some(iy) = win.input_row(oy, ky) else {
                    continue;
                };

                for kx in 0..k {
                    let Some(ix) = win.input_col(ox, kx) else {
                        continue;
                    };

                    sum += x[[b, iy, ix, ch]];
                    count += 1;
                }
            }

            if count == 0 { 0. } else { sum / count as f32 }
        },
    ))
}
