use std::fmt::{self, Display};

use ndarray::{Array1, Array2, Array4};

/// The classifier an optimizer step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Head {
    /// fc8 on top of every base layer, trained with Adam.
    Base,
    /// finetune_fc8 on top of the frozen fc7 features, trained with gradient descent.
    Finetune,
}

impl Head {
    pub fn name(self) -> &'static str {
        match self {
            Head::Base => "base",
            Head::Finetune => "finetune",
        }
    }
}

impl Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A handle to one optimizer update of the evaluation that produced it.
///
/// It can only be obtained from an [`Objective`] and goes stale as soon as the
/// parameters or outputs it was computed from change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerStep {
    pub(crate) head: Head,
    pub(crate) base_generation: u64,
    pub(crate) finetune_generation: u64,
}

impl OptimizerStep {
    pub fn head(&self) -> Head {
        self.head
    }
}

/// The training objective of one head.
#[derive(Debug, Clone)]
pub struct Objective {
    /// The one-hot labels the objective was computed against.
    pub labels: Array2<f32>,
    /// Cross-entropy of every example.
    pub loss: Array1<f32>,
    pub loss_mean: f32,
    /// Fraction of examples whose predicted class matches the label.
    pub accuracy: f32,
    pub step: OptimizerStep,
    pub(crate) loss_grad: Array2<f32>,
}

/// Every named output of the base network for one image batch.
#[derive(Debug, Clone)]
pub struct BaseEndpoints {
    /// The mean centered input.
    pub input: Array4<f32>,
    pub conv1: Array4<f32>,
    pub norm1: Array4<f32>,
    pub pool1: Array4<f32>,
    pub conv2: Array4<f32>,
    pub norm2: Array4<f32>,
    pub pool2: Array4<f32>,
    pub conv3: Array4<f32>,
    pub conv4: Array4<f32>,
    pub conv5: Array4<f32>,
    pub pool5: Array4<f32>,
    /// fc6 before its activation.
    pub fc6: Array2<f32>,
    /// fc6 after ReLU and, when training, dropout.
    pub relu6: Array2<f32>,
    pub fc7: Array2<f32>,
    /// fc7 after ReLU and, when training, dropout. Both heads read from it.
    pub relu7: Array2<f32>,
    pub tanh7: Array2<f32>,
    /// Logits of the base head.
    pub fc8: Array2<f32>,
    pub prob: Array2<f32>,
    /// Present only when the network is trainable.
    pub objective: Option<Objective>,
    pub(crate) pool1_argmax: Array4<usize>,
    pub(crate) pool2_argmax: Array4<usize>,
    pub(crate) pool5_argmax: Array4<usize>,
    pub(crate) drop6: Option<Array2<f32>>,
    pub(crate) drop7: Option<Array2<f32>>,
}

impl BaseEndpoints {
    pub fn batch_size(&self) -> usize {
        self.prob.nrows()
    }
}

/// The outputs of the fine-tune head.
#[derive(Debug, Clone)]
pub struct FinetuneEndpoints {
    /// Logits, `(N, object_class_num + 1)`.
    pub finetune_fc8: Array2<f32>,
    pub finetune_prob: Array2<f32>,
    pub objective: Option<Objective>,
}
