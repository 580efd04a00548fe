use ndarray::{Array, Array2, Array4, ArrayD, Dimension, Ix2, Ix4};

use super::{AlexNet, flatten};
use crate::{
    NetErr, Result,
    arch::{
        endpoints::{BaseEndpoints, Head, Objective},
        layers::{
            CONV1, CONV2, CONV3, CONV4, CONV5, ConvLayer, FC6, FC7, FcLayer, fc8, finetune_fc8,
        },
        ops::{self, Dropout, LrnParams},
    },
    params::{BIASES, ParamKey, WEIGHTS},
};

/// Gradients of the mean loss paired with the parameter they belong to.
pub(super) type Grads = Vec<(ParamKey, ArrayD<f32>)>;

fn push<D: Dimension, E: Dimension>(
    grads: &mut Grads,
    layer: &str,
    weights: Array<f32, D>,
    biases: Array<f32, E>,
) {
    grads.push((ParamKey::new(layer, WEIGHTS), weights.into_dyn()));
    grads.push((ParamKey::new(layer, BIASES), biases.into_dyn()));
}

fn objective(objective: Option<&Objective>, head: Head) -> Result<&Objective> {
    objective.ok_or(NetErr::MissingLabels { head: head.name() })
}

/// Undoes the dropout of a training pass, inference passes had none.
fn through_dropout(mask: Option<&Array2<f32>>, d: Array2<f32>) -> Result<Array2<f32>> {
    match mask {
        Some(mask) => Dropout::backward(mask, &d),
        None => Ok(d),
    }
}

impl AlexNet {
    /// Back propagates the base objective through every base layer.
    pub(super) fn base_gradients(&self) -> Result<Grads> {
        let base = self.base.as_ref().ok_or(NetErr::NotBuilt)?;
        let objective = objective(base.objective.as_ref(), Head::Base)?;
        let mut grads = Grads::new();

        let relu7 = self.fc_backward(
            &fc8(self.config.object_class_num),
            &base.relu7,
            objective.loss_grad.clone(),
            &mut grads,
        )?;
        let fc7 = ops::relu_backward(&base.fc7, &through_dropout(base.drop7.as_ref(), relu7)?)?;

        let relu6 = self.fc_backward(&FC7, &base.relu6, fc7, &mut grads)?;
        let fc6 = ops::relu_backward(&base.fc6, &through_dropout(base.drop6.as_ref(), relu6)?)?;

        let flat = self.fc_backward(&FC6, &flatten(base.pool5.view())?, fc6, &mut grads)?;
        let pool5 = flat.into_shape_with_order(base.pool5.raw_dim())?;

        self.conv_stack_backward(base, pool5, &mut grads)?;
        Ok(grads)
    }

    /// Back propagates the fine-tune objective into finetune_fc8 only, the features are frozen.
    pub(super) fn finetune_gradients(&self) -> Result<Grads> {
        let base = self.base.as_ref().ok_or(NetErr::NotBuilt)?;
        let finetune = self.finetune.as_ref().ok_or(NetErr::NotBuilt)?;
        let objective = objective(finetune.objective.as_ref(), Head::Finetune)?;
        let mut grads = Grads::new();

        self.fc_backward(
            &finetune_fc8(self.config.object_class_num),
            &base.relu7,
            objective.loss_grad.clone(),
            &mut grads,
        )?;

        Ok(grads)
    }

    fn conv_stack_backward(
        &self,
        base: &BaseEndpoints,
        d: Array4<f32>,
        grads: &mut Grads,
    ) -> Result<()> {
        let lrn = LrnParams::ALEXNET;

        let conv5 = ops::max_pool_backward(&base.pool5_argmax, d.view(), base.conv5.dim())?;
        let conv4 = self.conv_backward(&CONV5, &base.conv4, &base.conv5, conv5, grads)?;
        let conv3 = self.conv_backward(&CONV4, &base.conv3, &base.conv4, conv4, grads)?;
        let pool2 = self.conv_backward(&CONV3, &base.pool2, &base.conv3, conv3, grads)?;

        let norm2 = ops::max_pool_backward(&base.pool2_argmax, pool2.view(), base.norm2.dim())?;
        let conv2 = ops::local_response_norm_backward(base.conv2.view(), norm2.view(), &lrn)?;
        let pool1 = self.conv_backward(&CONV2, &base.pool1, &base.conv2, conv2, grads)?;

        let norm1 = ops::max_pool_backward(&base.pool1_argmax, pool1.view(), base.norm1.dim())?;
        let conv1 = ops::local_response_norm_backward(base.conv1.view(), norm1.view(), &lrn)?;
        self.conv_backward(&CONV1, &base.input, &base.conv1, conv1, grads)?;

        Ok(())
    }

    /// Back propagates through a dense layer, returning the gradient of its input.
    fn fc_backward(
        &self,
        layer: &FcLayer,
        x: &Array2<f32>,
        d: Array2<f32>,
        grads: &mut Grads,
    ) -> Result<Array2<f32>> {
        let w = self.param::<Ix2>(layer.name, WEIGHTS)?;
        let g = ops::dense_backward(x.view(), w, d.view())?;

        push(grads, layer.name, g.weights, g.biases);
        Ok(g.input)
    }

    /// Back propagates through a convolution and its ReLU.
    ///
    /// # Arguments
    /// * `layer` - The convolution.
    /// * `x` - Its input.
    /// * `activation` - Its output after ReLU.
    /// * `d` - The gradient with respect to `activation`.
    /// * `grads` - Where the filter and bias gradients are pushed.
    ///
    /// # Returns
    /// The gradient with respect to `x`.
    fn conv_backward(
        &self,
        layer: &ConvLayer,
        x: &Array4<f32>,
        activation: &Array4<f32>,
        d: Array4<f32>,
        grads: &mut Grads,
    ) -> Result<Array4<f32>> {
        let d = ops::relu_backward(activation, &d)?;
        let filters = self.param::<Ix4>(layer.name, WEIGHTS)?;
        let g = ops::conv2d_backward(x.view(), filters, d.view(), layer.stride, layer.padding)?;

        push(grads, layer.name, g.filters, g.biases);
        Ok(g.input)
    }
}
