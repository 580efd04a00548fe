//! The numerical kernels of the network, every image tensor is laid out as NHWC.

mod activations;
mod conv;
mod dense;
mod dropout;
mod loss;
mod lrn;
mod pool;

pub use activations::{relu, relu_backward, tanh};
pub use conv::{ConvGrads, conv2d, conv2d_backward};
pub use dense::{DenseGrads, dense, dense_backward};
pub use dropout::Dropout;
pub use loss::{CrossEntropy, accuracy, argmax, softmax, softmax_cross_entropy};
pub use lrn::{LrnParams, local_response_norm, local_response_norm_backward};
pub use pool::{MaxPool, avg_pool, max_pool, max_pool_backward};

use crate::{NetErr, Result};

/// How the borders of an image are handled by windowed kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Only windows that fit entirely inside the input.
    Valid,
    /// Zero pads so that the output size is `ceil(input / stride)`.
    Same,
}

impl Padding {
    /// Returns the output size and the padding before the first element along one axis.
    ///
    /// # Arguments
    /// * `input` - The input size along the axis.
    /// * `window` - The kernel size along the axis.
    /// * `stride` - The step between consecutive windows.
    ///
    /// # Returns
    /// An error if the window doesn't fit a `Valid` input or the stride is 0.
    pub fn output_size(self, input: usize, window: usize, stride: usize) -> Result<(usize, usize)> {
        if stride == 0 || window == 0 {
            return Err(NetErr::SizeMismatch {
                what: "window stride and size",
                got: 0,
                expected: 1,
            });
        }

        match self {
            Padding::Valid => {
                if input < window {
                    return Err(NetErr::SizeMismatch {
                        what: "valid window input",
                        got: input,
                        expected: window,
                    });
                }

                Ok(((input - window) / stride + 1, 0))
            }
            Padding::Same => {
                let out = input.div_ceil(stride);
                let total = ((out.saturating_sub(1)) * stride + window).saturating_sub(input);
                Ok((out, total / 2))
            }
        }
    }
}

/// Sliding window geometry shared by convolution and pooling.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub height: usize,
    pub width: usize,
    pub kh: usize,
    pub kw: usize,
    pub stride: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
}

impl Window {
    pub fn new(
        (height, width): (usize, usize),
        (kh, kw): (usize, usize),
        stride: usize,
        padding: Padding,
    ) -> Result<Self> {
        let (out_h, pad_top) = padding.output_size(height, kh, stride)?;
        let (out_w, pad_left) = padding.output_size(width, kw, stride)?;

        Ok(Self {
            height,
            width,
            kh,
            kw,
            stride,
            out_h,
            out_w,
            pad_top,
            pad_left,
        })
    }

    /// Maps an output row and a kernel row to an input row, `None` when it falls in the padding.
    pub fn input_row(&self, oy: usize, ky: usize) -> Option<usize> {
        (oy * self.stride + ky)
            .checked_sub(self.pad_top)
            .filter(|&iy| iy < self.height)
    }

    pub fn input_col(&self, ox: usize, kx: usize) -> Option<usize> {
        (ox * self.stride + kx)
            .checked_sub(self.pad_left)
            .filter(|&ix| ix < self.width)
    }
}
