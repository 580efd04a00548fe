use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};

use crate::{NetErr, Result};

/// Softmax cross-entropy of a batch, with the gradient of its mean.
#[derive(Debug, Clone)]
pub struct CrossEntropy {
    /// One loss per example.
    pub losses: Array1<f32>,
    pub mean: f32,
    /// Gradient of `mean` with respect to the logits.
    pub grad: Array2<f32>,
}

/// Index of the first maximum of `row`, 0 for an empty row.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, max)) if v <= max => best,
            _ => Some((i, v)),
        })
        .map_or(0, |(i, _)| i)
}

fn log_softmax_row(row: ArrayView1<f32>) -> Array1<f32> {
    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let shifted = row.mapv(|v| v - max);
    let log_sum = shifted.mapv(f32::exp).sum().ln();
    shifted - log_sum
}

/// Normalizes every row of `logits` into a probability distribution.
pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut prob = Array2::zeros(logits.raw_dim());

    Zip::from(prob.rows_mut())
        .and(logits.rows())
        .for_each(|mut prob, logits| prob.assign(&log_softmax_row(logits).mapv(f32::exp)));

    prob
}

fn check_labels(logits: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<()> {
    if logits.dim() != labels.dim() {
        return Err(NetErr::LabelShape {
            head: "logits",
            expected: logits.dim(),
            got: labels.dim(),
        });
    }

    Ok(())
}

/// Computes `-sum(labels * log(softmax(logits)))` per row, its mean and the mean's gradient.
///
/// # Arguments
/// * `logits` - The raw class scores, `(N, classes)`.
/// * `labels` - The target distributions, usually one-hot, `(N, classes)`.
///
/// # Returns
/// The losses or an error if the shapes differ.
pub fn softmax_cross_entropy(
    logits: ArrayView2<f32>,
    labels: ArrayView2<f32>,
) -> Result<CrossEntropy> {
    check_labels(logits, labels)?;

    let n = logits.nrows();
    let mut losses = Array1::zeros(n);
    let mut grad = Array2::zeros(logits.raw_dim());

    Zip::from(&mut losses)
        .and(grad.rows_mut())
        .and(logits.rows())
        .and(labels.rows())
        .for_each(|loss, mut grad, logits, labels| {
            let log_prob = log_softmax_row(logits);
            *loss = -(&labels * &log_prob).sum();

            // d/dz of -sum(y * log_softmax(z)) is softmax(z) * sum(y) - y
            let total = labels.sum();
            grad.assign(&(log_prob.mapv(f32::exp) * total - &labels));
        });

    if n > 0 {
        grad /= n as f32;
    }

    Ok(CrossEntropy {
        mean: losses.mean().unwrap_or_default(),
        losses,
        grad,
    })
}

/// Fraction of rows whose largest logit sits where their largest label does.
pub fn accuracy(logits: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<f32> {
    check_labels(logits, labels)?;

    let hits = logits
        .rows()
        .into_iter()
        .zip(labels.rows())
        .map(|(logits, labels)| (argmax(logits) == argmax(labels)) as u8 as f32)
        .collect::<Array1<f32>>();

    Ok(hits.mean().unwrap_or_default())
}
