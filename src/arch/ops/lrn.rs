use ndarray::{Array4, ArrayView1, ArrayView4, Axis, Zip};

use crate::{NetErr, Result};

/// Constants of a local response normalization across channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrnParams {
    pub depth_radius: usize,
    pub bias: f32,
    pub alpha: f32,
    pub beta: f32,
}

impl LrnParams {
    /// The normalization used after the first two convolutions.
    pub const ALEXNET: Self = Self {
        depth_radius: 2,
        bias: 1.,
        alpha: 1e-4,
        beta: 0.75,
    };

    /// Channels whose squares are summed for channel `c`.
    fn neighbours(&self, c: usize, len: usize) -> std::ops::RangeInclusive<usize> {
        c.saturating_sub(self.depth_radius)..=(c + self.depth_radius).min(len - 1)
    }

    /// Computes `bias + alpha * sum(x[c']^2)` over the window of every channel.
    fn scales(&self, x: ArrayView1<f32>) -> Vec<f32> {
        let len = x.len();

        (0..len)
            .map(|c| {
                let sqr_sum: f32 = self.neighbours(c, len).map(|j| x[j] * x[j]).sum();
                self.bias + self.alpha * sqr_sum
            })
            .collect()
    }
}

/// Divides every activation by a power of the squared activations of its nearby channels.
pub fn local_response_norm(x: ArrayView4<f32>, params: &LrnParams) -> Array4<f32> {
    let mut out = Array4::zeros(x.raw_dim());

    Zip::from(out.lanes_mut(Axis(3)))
        .and(x.lanes(Axis(3)))
        .par_for_each(|mut out, x| {
            for (c, scale) in params.scales(x).into_iter().enumerate() {
                out[c] = x[c] * scale.powf(-params.beta);
            }
        });

    out
}

/// Back propagates through `local_response_norm`.
///
/// # Arguments
/// * `x` - The input of the forward pass.
/// * `d` - The gradient of the loss with respect to the normalized output.
/// * `params` - The forward pass constants.
pub fn local_response_norm_backward(
    x: ArrayView4<f32>,
    d: ArrayView4<f32>,
    params: &LrnParams,
) -> Result<Array4<f32>> {
    if x.dim() != d.dim() {
        return Err(NetErr::SizeMismatch {
            what: "normalization output gradient",
            got: d.len(),
            expected: x.len(),
        });
    }

    let LrnParams { alpha, beta, .. } = *params;
    let mut dx = Array4::zeros(x.raw_dim());

    Zip::from(dx.lanes_mut(Axis(3)))
        .and(x.lanes(Axis(3)))
        .and(d.lanes(Axis(3)))
        .par_for_each(|mut dx, x, d| {
            let len = x.len();
            let scales = params.scales(x);
            // d * x * scale^(-beta - 1), shared by every channel in the window
            let shared: Vec<f32> = (0..len)
                .map(|c| d[c] * x[c] * scales[c].powf(-beta - 1.))
                .collect();

            for j in 0..len {
                let cross: f32 = params.neighbours(j, len).map(|c| shared[c]).sum();
                dx[j] = d[j] * scales[j].powf(-beta) - 2. * alpha * beta * x[j] * cross;
            }
        });

    Ok(dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array4};

    fn input() -> Array4<f32> {
        Array::range(0., 14., 1.)
            .mapv(|v: f32| (v * 0.7).sin() * 20.)
            .into_shape_with_order((1, 2, 1, 7))
            .unwrap()
    }

    #[test]
    fn matches_hand_computed_value() {
        let x = Array::from_shape_vec((1, 1, 1, 5), vec![1., 2., 3., 4., 5.]).unwrap();
        let out = local_response_norm(x.view(), &LrnParams::ALEXNET);

        // channel 0 sees channels 0..=2, channel 2 sees all five
        let expected0 = 1. / (1f32 + 1e-4 * (1. + 4. + 9.)).powf(0.75);
        let expected2 = 3. / (1f32 + 1e-4 * 55.).powf(0.75);

        assert!((out[[0, 0, 0, 0]] - expected0).abs() < 1e-6);
        assert!((out[[0, 0, 0, 2]] - expected2).abs() < 1e-6);
    }

    #[test]
    fn backward_matches_finite_differences() {
        // a large alpha makes the cross channel terms visible
        let params = LrnParams {
            depth_radius: 2,
            bias: 1.,
            alpha: 1e-2,
            beta: 0.75,
        };
        let x = input() / 10.;
        let r = input().mapv(|v| (v * 0.3).cos());

        let loss = |x: &Array4<f32>| (&local_response_norm(x.view(), &params) * &r).sum();
        let dx = local_response_norm_backward(x.view(), r.view(), &params).unwrap();
        let eps = 1e-2;

        for idx in [[0, 0, 0, 0], [0, 0, 0, 3], [0, 1, 0, 6], [0, 1, 0, 2]] {
            let mut xp = x.clone();
            xp[idx] += eps;
            let mut xm = x.clone();
            xm[idx] -= eps;
            let numeric = (loss(&xp) - loss(&xm)) / (2. * eps);

            assert!((numeric - dx[idx]).abs() < 5e-3, "{idx:?}: {numeric} vs {}", dx[idx]);
        }
    }

    #[test]
    fn shape_mismatch() {
        let x = input();
        let d = Array4::zeros((1, 2, 1, 6));

        assert!(local_response_norm_backward(x.view(), d.view(), &LrnParams::ALEXNET).is_err());
    }
}
