use ndarray::{
    Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, ArrayView4, Axis, linalg, s,
};
use rayon::prelude::*;

use super::{Padding, Window};
use crate::{NetErr, Result};

/// The gradients of a convolution with respect to its filters, biases and input.
#[derive(Debug)]
pub struct ConvGrads {
    pub filters: Array4<f32>,
    pub biases: Array1<f32>,
    pub input: Array4<f32>,
}

/// Convolution geometry, checked once per call.
struct Geometry {
    window: Window,
    channels: usize,
    out_channels: usize,
}

impl Geometry {
    fn new(
        x: (usize, usize, usize, usize),
        filters: (usize, usize, usize, usize),
        stride: usize,
        padding: Padding,
    ) -> Result<Self> {
        let (_, height, width, channels) = x;
        let (kh, kw, in_channels, out_channels) = filters;

        if channels != in_channels {
            return Err(NetErr::SizeMismatch {
                what: "convolution input channels",
                got: channels,
                expected: in_channels,
            });
        }

        Ok(Self {
            window: Window::new((height, width), (kh, kw), stride, padding)?,
            channels,
            out_channels,
        })
    }

    /// Length of one flattened receptive field.
    fn patch_len(&self) -> usize {
        self.window.kh * self.window.kw * self.channels
    }

    fn out_pixels(&self) -> usize {
        self.window.out_h * self.window.out_w
    }
}

/// Lays out every receptive field of `x` as a row, ordered `(ky, kx, channel)` like the filters.
fn im2col(x: ArrayView3<f32>, g: &Geometry) -> Array2<f32> {
    let w = &g.window;
    let c = g.channels;
    let mut cols = Array2::zeros((g.out_pixels(), g.patch_len()));

    for (row, mut patch) in cols.outer_iter_mut().enumerate() {
        let (oy, ox) = (row / w.out_w, row % w.out_w);

        for ky in 0..w.kh {
            let Some(iy) = w.input_row(oy, ky) else {
                continue;
            };

            for kx in 0..w.kw {
                let Some(ix) = w.input_col(ox, kx) else {
                    continue;
                };

                let start = (ky * w.kw + kx) * c;
                patch
                    .slice_mut(s![start..start + c])
                    .assign(&x.slice(s![iy, ix, ..]));
            }
        }
    }

    cols
}

/// Inverse of `im2col`, overlapping receptive fields are summed.
fn col2im(cols: ArrayView2<f32>, g: &Geometry) -> Array3<f32> {
    let w = &g.window;
    let c = g.channels;
    let mut x = Array3::zeros((w.height, w.width, c));

    for (row, patch) in cols.outer_iter().enumerate() {
        let (oy, ox) = (row / w.out_w, row % w.out_w);

        for ky in 0..w.kh {
            let Some(iy) = w.input_row(oy, ky) else {
                continue;
            };

            for kx in 0..w.kw {
                let Some(ix) = w.input_col(ox, kx) else {
                    continue;
                };

                let start = (ky * w.kw + kx) * c;
                let mut pixel = x.slice_mut(s![iy, ix, ..]);
                pixel += &patch.slice(s![start..start + c]);
            }
        }
    }

    x
}

/// Convolves a batch of images with a bank of filters and adds the biases.
///
/// # Arguments
/// * `x` - The input batch, `(N, H, W, C)`.
/// * `filters` - The filters, `(K, K, C, O)`.
/// * `biases` - One bias per output channel.
/// * `stride` - The step between windows on both spatial axes.
/// * `padding` - The border handling.
///
/// # Returns
/// The `(N, OH, OW, O)` output or an error if the shapes don't line up.
pub fn conv2d(
    x: ArrayView4<f32>,
    filters: ArrayView4<f32>,
    biases: ArrayView1<f32>,
    stride: usize,
    padding: Padding,
) -> Result<Array4<f32>> {
    let g = Geometry::new(x.dim(), filters.dim(), stride, padding)?;

    if biases.len() != g.out_channels {
        return Err(NetErr::SizeMismatch {
            what: "convolution biases",
            got: biases.len(),
            expected: g.out_channels,
        });
    }

    let w = filters.to_shape((g.patch_len(), g.out_channels))?;
    let n = x.len_of(Axis(0));
    let mut out = Array4::zeros((n, g.window.out_h, g.window.out_w, g.out_channels));

    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(x.axis_iter(Axis(0)))
        .try_for_each(|(out, x)| -> Result<()> {
            let cols = im2col(x, &g);
            let mut out = out.into_shape_with_order((g.out_pixels(), g.out_channels))?;
            linalg::general_mat_mul(1.0, &cols, &w, 0.0, &mut out);
            out += &biases;
            Ok(())
        })?;

    Ok(out)
}

/// Back propagates through `conv2d`.
///
/// # Arguments
/// * `x` - The input the forward pass was computed with.
/// * `filters` - The filters the forward pass was computed with.
/// * `d` - The gradient of the loss with respect to the convolution's output.
/// * `stride`, `padding` - The forward pass geometry.
///
/// # Returns
/// The filter, bias and input gradients.
pub fn conv2d_backward(
    x: ArrayView4<f32>,
    filters: ArrayView4<f32>,
    d: ArrayView4<f32>,
    stride: usize,
    padding: Padding,
) -> Result<ConvGrads> {
    let g = Geometry::new(x.dim(), filters.dim(), stride, padding)?;
    let n = x.len_of(Axis(0));
    let expected = (n, g.window.out_h, g.window.out_w, g.out_channels);

    if d.dim() != expected {
        return Err(NetErr::SizeMismatch {
            what: "convolution output gradient",
            got: d.len(),
            expected: expected.0 * expected.1 * expected.2 * expected.3,
        });
    }

    let w = filters.to_shape((g.patch_len(), g.out_channels))?;

    let partials = x
        .axis_iter(Axis(0))
        .into_par_iter()
        .zip(d.axis_iter(Axis(0)))
        .map(|(x, d)| -> Result<(Array2<f32>, Array1<f32>, Array3<f32>)> {
            let cols = im2col(x, &g);
            let d = d.to_shape((g.out_pixels(), g.out_channels))?;

            let dw = cols.t().dot(&d);
            let db = d.sum_axis(Axis(0));
            let dx = col2im(d.dot(&w.t()).view(), &g);

            Ok((dw, db, dx))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut dw = Array2::zeros((g.patch_len(), g.out_channels));
    let mut db = Array1::zeros(g.out_channels);
    let mut dx = Array4::zeros(x.raw_dim());

    for (i, (dwi, dbi, dxi)) in partials.into_iter().enumerate() {
        dw += &dwi;
        db += &dbi;
        dx.index_axis_mut(Axis(0), i).assign(&dxi);
    }

    Ok(ConvGrads {
        filters: dw.into_shape_with_order(filters.raw_dim())?,
        biases: db,
        input: dx,
    })
}
