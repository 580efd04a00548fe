mod backward;

use std::fmt;

use log::{debug, info, warn};
use ndarray::{
    Array2, Array4, ArrayD, ArrayView, ArrayView2, ArrayView4, Axis, Dimension, Ix1, Ix2, Ix4,
};
use rand::{SeedableRng, rngs::StdRng};

use super::{
    endpoints::{BaseEndpoints, FinetuneEndpoints, Head, Objective, OptimizerStep},
    layers::{
        CONV_LAYERS, CONV1, CONV2, CONV3, CONV4, CONV5, ConvLayer, FC6, FC7, FcLayer, POOL_SIZE,
        POOL_STRIDE, fc8, finetune_fc8,
    },
    ops::{self, Dropout, LrnParams, Padding},
};
use crate::{
    NetErr, Result,
    config::NetConfig,
    initialization::TruncatedNormal,
    optimization::{Adam, GradientDescent, Optimizer, OptimizerSlots},
    params::{BIASES, LayerKind, Param, ParamKey, ParamStore, WEIGHTS},
    pretrained::PretrainedWeights,
};

/// Learning rate of the Adam step over every base parameter.
pub const BASE_LEARNING_RATE: f32 = 0.0025;
/// Learning rate of the gradient descent step over the fine-tune head.
pub const FINETUNE_LEARNING_RATE: f32 = 0.0001;
/// Probability of keeping an fc6 or fc7 activation while training.
pub const KEEP_PROB: f32 = 0.5;
/// Standard deviation of the truncated normal used for parameters without a pretrained value.
pub const INIT_STD_DEV: f32 = 0.001;

/// Amount of image channels, in blue, green, red order.
const CHANNELS: usize = 3;

/// Builds the AlexNet topology over an image batch and owns its parameters.
///
/// `build` materializes every base parameter, either from the pretrained
/// weights given at construction or from a truncated normal, and runs the
/// forward pass. When the configuration is trainable each head also gets a
/// softmax cross-entropy objective whose `step` can be handed to `minimize`.
pub struct AlexNet {
    config: NetConfig,
    pretrained: Option<PretrainedWeights>,
    params: ParamStore,
    init: TruncatedNormal,
    dropout: Dropout,
    rng: StdRng,
    base: Option<BaseEndpoints>,
    finetune: Option<FinetuneEndpoints>,
    adam: OptimizerSlots<Adam>,
    sgd: OptimizerSlots<GradientDescent>,
    base_generation: u64,
    finetune_generation: u64,
}

impl AlexNet {
    /// Creates a new `AlexNet` builder.
    ///
    /// # Arguments
    /// * `config` - The network configuration.
    /// * `pretrained` - Values to use instead of random ones, looked up by layer name.
    ///
    /// # Returns
    /// A new `AlexNet` or an error if the configuration is invalid.
    pub fn new(config: NetConfig, pretrained: Option<PretrainedWeights>) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            pretrained,
            params: ParamStore::new(),
            init: TruncatedNormal::new(0., INIT_STD_DEV)?,
            dropout: Dropout::new(KEEP_PROB)?,
            rng,
            base: None,
            finetune: None,
            adam: OptimizerSlots::new(|len| Adam::with_defaults(len, BASE_LEARNING_RATE)),
            sgd: OptimizerSlots::new(|_| GradientDescent::new(FINETUNE_LEARNING_RATE)),
            base_generation: 0,
            finetune_generation: 0,
            config,
        })
    }

    /// Materializes the base parameters and runs the network over a batch.
    ///
    /// Building again discards every parameter, the fine-tune head and the
    /// optimizer state. The pretrained weights are dropped after the first
    /// successful build, so a rebuild starts from random values.
    ///
    /// # Arguments
    /// * `images` - The image batch, `(N, 227, 227, 3)` in blue, green, red order.
    /// * `labels` - One-hot labels, `(N, object_class_num)`, required when trainable.
    ///
    /// # Returns
    /// The named outputs of every layer or an error, in which case nothing stays built.
    pub fn build(
        &mut self,
        images: ArrayView4<f32>,
        labels: Option<ArrayView2<f32>>,
    ) -> Result<&BaseEndpoints> {
        if !self.params.is_empty() {
            warn!(
                "rebuilding, discarding {} parameters and their optimizer state",
                self.params.count()
            );
        }
        self.reset();

        let built = self
            .materialize_base()
            .and_then(|()| self.run_base(images, labels));

        if let Err(e) = built {
            self.reset();
            return Err(e);
        }

        self.pretrained = None;
        info!(
            "built alexnet with {} parameters over a batch of {}",
            self.param_count(),
            images.len_of(Axis(0))
        );

        self.base.as_ref().ok_or(NetErr::NotBuilt)
    }

    /// Runs the built network over a new batch with the current parameters.
    ///
    /// Outputs of the fine-tune head are dropped since they belong to the
    /// previous batch, its parameters stay and `evaluate_finetune` refreshes them.
    pub fn evaluate(
        &mut self,
        images: ArrayView4<f32>,
        labels: Option<ArrayView2<f32>>,
    ) -> Result<&BaseEndpoints> {
        if self.params.is_empty() {
            return Err(NetErr::NotBuilt);
        }

        self.run_base(images, labels)?;
        self.base.as_ref().ok_or(NetErr::NotBuilt)
    }

    /// Adds the fine-tune classifier on top of the fc7 features of the last batch.
    ///
    /// # Arguments
    /// * `labels` - One-hot labels, `(N, object_class_num + 1)`, required when trainable.
    ///
    /// # Returns
    /// The head's outputs or `NotBuilt` if `build` didn't succeed before.
    pub fn build_finetune(
        &mut self,
        labels: Option<ArrayView2<f32>>,
    ) -> Result<&FinetuneEndpoints> {
        if self.base.is_none() {
            return Err(NetErr::NotBuilt);
        }

        let layer = finetune_fc8(self.config.object_class_num);
        if self.params.contains(&ParamKey::new(layer.name, WEIGHTS)) {
            warn!("rebuilding {}, discarding its parameters", layer.name);
        }
        self.drop_finetune();

        let built = self
            .materialize_fc(&layer)
            .and_then(|()| self.run_finetune(labels));

        if let Err(e) = built {
            self.drop_finetune();
            return Err(e);
        }

        self.finetune.as_ref().ok_or(NetErr::NotBuilt)
    }

    /// Runs the fine-tune head again over the current base outputs.
    pub fn evaluate_finetune(
        &mut self,
        labels: Option<ArrayView2<f32>>,
    ) -> Result<&FinetuneEndpoints> {
        let layer = finetune_fc8(self.config.object_class_num);
        if self.base.is_none() || !self.params.contains(&ParamKey::new(layer.name, WEIGHTS)) {
            return Err(NetErr::NotBuilt);
        }

        self.run_finetune(labels)?;
        self.finetune.as_ref().ok_or(NetErr::NotBuilt)
    }

    /// Applies one optimizer update for the objective that produced `step`.
    ///
    /// The outputs stay those of the evaluation `step` came from, so any
    /// further step needs a new `evaluate`.
    ///
    /// # Returns
    /// `StaleStep` if the parameters or outputs changed since `step` was produced.
    pub fn minimize(&mut self, step: &OptimizerStep) -> Result<()> {
        if step.base_generation != self.base_generation {
            return Err(NetErr::StaleStep);
        }

        match step.head {
            Head::Base => {
                let grads = self.base_gradients()?;
                apply(&mut self.params, &mut self.adam, grads)?;
                self.base_generation += 1;
            }
            Head::Finetune => {
                if step.finetune_generation != self.finetune_generation {
                    return Err(NetErr::StaleStep);
                }

                let grads = self.finetune_gradients()?;
                apply(&mut self.params, &mut self.sgd, grads)?;
                self.finetune_generation += 1;
            }
        }

        debug!(
            "applied a {} step, loss before the step {}",
            step.head,
            self.loss_mean(step.head).unwrap_or(f32::NAN)
        );

        Ok(())
    }

    /// Returns the total amount of scalars across every registered parameter.
    pub fn param_count(&self) -> usize {
        self.params.count()
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Returns the outputs of the last base evaluation.
    pub fn base(&self) -> Option<&BaseEndpoints> {
        self.base.as_ref()
    }

    /// Returns the outputs of the last fine-tune evaluation.
    pub fn finetune(&self) -> Option<&FinetuneEndpoints> {
        self.finetune.as_ref()
    }

    /// Whether the pretrained weights are still waiting for a build.
    pub fn has_pretrained(&self) -> bool {
        self.pretrained.is_some()
    }

    fn loss_mean(&self, head: Head) -> Option<f32> {
        let objective = match head {
            Head::Base => self.base.as_ref()?.objective.as_ref(),
            Head::Finetune => self.finetune.as_ref()?.objective.as_ref(),
        };

        objective.map(|o| o.loss_mean)
    }

    fn reset(&mut self) {
        self.params.clear();
        self.base = None;
        self.finetune = None;
        self.adam.reset();
        self.sgd.reset();
        self.base_generation += 1;
        self.finetune_generation += 1;
    }

    fn drop_finetune(&mut self) {
        let layer = finetune_fc8(self.config.object_class_num);
        self.params.remove_layer(layer.name);
        self.finetune = None;
        self.sgd.reset();
        self.finetune_generation += 1;
    }

    fn materialize_base(&mut self) -> Result<()> {
        for layer in &CONV_LAYERS {
            self.materialize(layer.name, LayerKind::Conv, WEIGHTS, &layer.filters_shape())?;
            self.materialize(layer.name, LayerKind::Conv, BIASES, &[layer.out_channels])?;
        }

        for layer in [FC6, FC7, fc8(self.config.object_class_num)] {
            self.materialize_fc(&layer)?;
        }

        Ok(())
    }

    fn materialize_fc(&mut self, layer: &FcLayer) -> Result<()> {
        self.materialize(layer.name, LayerKind::Fc, WEIGHTS, &layer.weights_shape())?;
        self.materialize(layer.name, LayerKind::Fc, BIASES, &[layer.out_size])
    }

    /// Registers `(layer, slot)` with its pretrained value if there's one, else a random one.
    fn materialize(
        &mut self,
        layer: &str,
        kind: LayerKind,
        slot: usize,
        shape: &[usize],
    ) -> Result<()> {
        let name = format!("{layer}_{}", kind.suffix(slot));

        let value = match self.pretrained.as_ref().and_then(|p| p.get(layer)) {
            Some(values) => {
                let value = &values[slot];
                if value.shape() != shape {
                    return Err(NetErr::ShapeMismatch {
                        param: name,
                        expected: shape.to_vec(),
                        got: value.shape().to_vec(),
                    });
                }

                debug!("{name} {shape:?} loaded from the pretrained weights");
                value.clone()
            }
            None => {
                debug!("{name} {shape:?} randomly initialized");
                self.init.array(shape, &mut self.rng)
            }
        };

        let key = ParamKey::new(layer, slot);
        self.params
            .register(key.clone(), Param::new(name, value))
            .map_err(|_| NetErr::DuplicateParam(key))
    }

    fn param<D: Dimension>(&self, layer: &str, slot: usize) -> Result<ArrayView<'_, f32, D>> {
        let value = self.params.value(layer, slot).ok_or(NetErr::NotBuilt)?;
        Ok(value.view().into_dimensionality::<D>()?)
    }

    /// Checks the labels of a head, they are only used when trainable.
    fn training_labels(
        &self,
        head: Head,
        labels: Option<ArrayView2<f32>>,
        expected: (usize, usize),
    ) -> Result<Option<Array2<f32>>> {
        if !self.config.trainable {
            return Ok(None);
        }

        let labels = labels.ok_or(NetErr::MissingLabels { head: head.name() })?;
        if labels.dim() != expected {
            return Err(NetErr::LabelShape {
                head: head.name(),
                expected,
                got: labels.dim(),
            });
        }

        Ok(Some(labels.to_owned()))
    }

    /// Subtracts the configured mean from each channel.
    fn center(&self, images: ArrayView4<f32>) -> Array4<f32> {
        let mut centered = images.to_owned();

        for (c, mean) in self.config.mean.iter().enumerate() {
            centered
                .index_axis_mut(Axis(3), c)
                .mapv_inplace(|v| v - mean);
        }

        centered
    }

    fn conv_layer(&self, layer: &ConvLayer, x: ArrayView4<f32>) -> Result<Array4<f32>> {
        let z = ops::conv2d(
            x,
            self.param::<Ix4>(layer.name, WEIGHTS)?,
            self.param::<Ix1>(layer.name, BIASES)?,
            layer.stride,
            layer.padding,
        )?;

        Ok(ops::relu(&z))
    }

    fn fc_layer(&self, layer: &FcLayer, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        ops::dense(
            x,
            self.param::<Ix2>(layer.name, WEIGHTS)?,
            self.param::<Ix1>(layer.name, BIASES)?,
        )
    }

    fn run_base(&mut self, images: ArrayView4<f32>, labels: Option<ArrayView2<f32>>) -> Result<()> {
        self.base = None;
        self.finetune = None;
        self.base_generation += 1;

        let (n, _, _, channels) = images.dim();
        if channels != CHANNELS {
            return Err(NetErr::ChannelMismatch {
                expected: CHANNELS,
                got: channels,
            });
        }

        let classes = self.config.object_class_num;
        let labels = self.training_labels(Head::Base, labels, (n, classes))?;
        let lrn = LrnParams::ALEXNET;

        let input = self.center(images);
        let conv1 = self.conv_layer(&CONV1, input.view())?;
        let norm1 = ops::local_response_norm(conv1.view(), &lrn);
        let pool1 = ops::max_pool(norm1.view(), POOL_SIZE, POOL_STRIDE, Padding::Valid)?;

        let conv2 = self.conv_layer(&CONV2, pool1.output.view())?;
        let norm2 = ops::local_response_norm(conv2.view(), &lrn);
        let pool2 = ops::max_pool(norm2.view(), POOL_SIZE, POOL_STRIDE, Padding::Valid)?;

        let conv3 = self.conv_layer(&CONV3, pool2.output.view())?;
        let conv4 = self.conv_layer(&CONV4, conv3.view())?;
        let conv5 = self.conv_layer(&CONV5, conv4.view())?;
        let pool5 = ops::max_pool(conv5.view(), POOL_SIZE, POOL_STRIDE, Padding::Valid)?;

        let training = self.config.trainable;
        let fc6 = self.fc_layer(&FC6, flatten(pool5.output.view())?.view())?;
        let (relu6, drop6) = self
            .dropout
            .forward(&ops::relu(&fc6), training, &mut self.rng);

        let fc7 = self.fc_layer(&FC7, relu6.view())?;
        let tanh7 = ops::tanh(&fc7);
        let (relu7, drop7) = self
            .dropout
            .forward(&ops::relu(&fc7), training, &mut self.rng);

        let fc8 = self.fc_layer(&fc8(classes), relu7.view())?;
        let prob = ops::softmax(fc8.view());

        let step = OptimizerStep {
            head: Head::Base,
            base_generation: self.base_generation,
            finetune_generation: self.finetune_generation,
        };
        let objective = labels
            .map(|labels| objective(fc8.view(), labels, step))
            .transpose()?;

        if let Some(objective) = &objective {
            debug!(
                "base loss {}, accuracy {}",
                objective.loss_mean, objective.accuracy
            );
        }

        self.base = Some(BaseEndpoints {
            input,
            conv1,
            norm1,
            pool1: pool1.output,
            conv2,
            norm2,
            pool2: pool2.output,
            conv3,
            conv4,
            conv5,
            pool5: pool5.output,
            fc6,
            relu6,
            fc7,
            relu7,
            tanh7,
            fc8,
            prob,
            objective,
            pool1_argmax: pool1.argmax,
            pool2_argmax: pool2.argmax,
            pool5_argmax: pool5.argmax,
            drop6,
            drop7,
        });

        Ok(())
    }

    fn run_finetune(&mut self, labels: Option<ArrayView2<f32>>) -> Result<()> {
        self.finetune = None;
        self.finetune_generation += 1;

        let base = self.base.as_ref().ok_or(NetErr::NotBuilt)?;
        let layer = finetune_fc8(self.config.object_class_num);
        let labels =
            self.training_labels(Head::Finetune, labels, (base.batch_size(), layer.out_size))?;

        let logits = self.fc_layer(&layer, base.relu7.view())?;
        let prob = ops::softmax(logits.view());

        let step = OptimizerStep {
            head: Head::Finetune,
            base_generation: self.base_generation,
            finetune_generation: self.finetune_generation,
        };
        let objective = labels
            .map(|labels| objective(logits.view(), labels, step))
            .transpose()?;

        self.finetune = Some(FinetuneEndpoints {
            finetune_fc8: logits,
            finetune_prob: prob,
            objective,
        });

        Ok(())
    }
}

impl fmt::Debug for AlexNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlexNet")
            .field("config", &self.config)
            .field("has_pretrained", &self.has_pretrained())
            .field("params", &self.params.len())
            .field("param_count", &self.param_count())
            .field("built", &self.base.is_some())
            .field("finetune", &self.finetune.is_some())
            .finish()
    }
}

/// Flattens pool5 row by row into the input of fc6.
fn flatten(x: ArrayView4<f32>) -> Result<Array2<f32>> {
    let n = x.len_of(Axis(0));
    let size: usize = x.shape()[1..].iter().product();

    if size != FC6.in_size {
        return Err(NetErr::SizeMismatch {
            what: "fc6 input, images must be 227 x 227",
            got: size,
            expected: FC6.in_size,
        });
    }

    Ok(x.to_shape((n, size))?.into_owned())
}

fn objective(
    logits: ArrayView2<f32>,
    labels: Array2<f32>,
    step: OptimizerStep,
) -> Result<Objective> {
    let ce = ops::softmax_cross_entropy(logits, labels.view())?;
    let accuracy = ops::accuracy(logits, labels.view())?;

    Ok(Objective {
        labels,
        loss: ce.losses,
        loss_mean: ce.mean,
        accuracy,
        step,
        loss_grad: ce.grad,
    })
}

/// Updates every parameter with its gradient through the optimizer slots of a head.
fn apply<O: Optimizer>(
    params: &mut ParamStore,
    slots: &mut OptimizerSlots<O>,
    grads: Vec<(ParamKey, ArrayD<f32>)>,
) -> Result<()> {
    for (key, grad) in grads {
        let param = params.get_mut(&key).ok_or(NetErr::NotBuilt)?;
        let grad = grad.as_standard_layout();
        slots.update(&key, grad.as_slice().unwrap_or_default(), param.values_mut())?;
    }

    Ok(())
}
