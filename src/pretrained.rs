use std::{collections::HashMap, fs, path::Path};

use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{
    NetErr, Result,
    params::{BIASES, WEIGHTS},
};

/// Read-only mapping from a layer name to its `[weights_or_filters, biases]` pair.
///
/// A missing layer is not an error, the builder just initializes that layer at random.
#[derive(Debug, Clone, Default)]
pub struct PretrainedWeights {
    layers: HashMap<String, [ArrayD<f32>; 2]>,
}

impl PretrainedWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the pair of a layer.
    pub fn insert(&mut self, layer: &str, weights: ArrayD<f32>, biases: ArrayD<f32>) {
        self.layers.insert(layer.to_string(), [weights, biases]);
    }

    pub fn get(&self, layer: &str) -> Option<&[ArrayD<f32>; 2]> {
        self.layers.get(layer)
    }

    pub fn contains(&self, layer: &str) -> bool {
        self.layers.contains_key(layer)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Parses a safetensors buffer.
    ///
    /// Tensors are named `<layer>_filters` or `<layer>_weights` for slot 0 and
    /// `<layer>_biases` for slot 1, and must be `f32`.
    ///
    /// # Arguments
    /// * `bytes` - The serialized safetensors buffer.
    ///
    /// # Returns
    /// The mapping, or an error if a tensor is malformed or a layer lacks or repeats one of its
    /// slots.
    pub fn from_safetensors(bytes: &[u8]) -> Result<Self> {
        let tensors = SafeTensors::deserialize(bytes)?;
        let mut slots: HashMap<String, [Option<ArrayD<f32>>; 2]> = HashMap::new();

        for (name, view) in tensors.tensors() {
            let (layer, slot) = split_name(&name)?;

            if view.dtype() != Dtype::F32 {
                return Err(NetErr::Pretrained(format!(
                    "{name} has dtype {:?}, only F32 is supported",
                    view.dtype()
                )));
            }

            let data: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
            let value = ArrayD::from_shape_vec(IxDyn(view.shape()), data)
                .map_err(|e| NetErr::Pretrained(format!("{name}: {e}")))?;

            let pair = slots.entry(layer.to_string()).or_default();
            if pair[slot].is_some() {
                return Err(NetErr::Pretrained(format!(
                    "duplicate slot {slot} of layer {layer}, {name} clashes with another tensor"
                )));
            }
            pair[slot] = Some(value);
        }

        let mut pretrained = Self::new();
        for (layer, pair) in slots {
            let [Some(weights), Some(biases)] = pair else {
                return Err(NetErr::Pretrained(format!(
                    "layer {layer} needs both weights and biases"
                )));
            };

            pretrained.layers.insert(layer, [weights, biases]);
        }

        Ok(pretrained)
    }

    /// Serializes the mapping in the format `from_safetensors` reads.
    ///
    /// Slot 0 of layers whose name starts with `conv` is written as `_filters`, every other
    /// layer uses `_weights`.
    pub fn to_safetensors(&self) -> Result<Vec<u8>> {
        let arrays: Vec<(String, ArrayD<f32>)> = self
            .layers
            .iter()
            .flat_map(|(layer, [weights, biases])| {
                let suffix = if layer.starts_with("conv") {
                    "filters"
                } else {
                    "weights"
                };

                [
                    (format!("{layer}_{suffix}"), weights),
                    (format!("{layer}_biases"), biases),
                ]
            })
            .map(|(name, value)| (name, value.as_standard_layout().into_owned()))
            .collect();

        let views = arrays
            .iter()
            .map(|(name, value)| -> Result<(&str, TensorView<'_>)> {
                // standard layout was forced above, so the slice is always there
                let data = value.as_slice().unwrap_or_default();
                let view = TensorView::new(
                    Dtype::F32,
                    value.shape().to_vec(),
                    bytemuck::cast_slice(data),
                )?;
                Ok((name.as_str(), view))
            })
            .collect::<Result<Vec<_>>>()?;

        let bytes = safetensors::serialize(views.iter().map(|(n, v)| (*n, v)), &None)?;
        Ok(bytes)
    }

    /// Reads a safetensors file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_safetensors(&bytes)
    }

    /// Writes the mapping to a safetensors file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_safetensors()?)?;
        Ok(())
    }
}

/// Splits a tensor name into its layer name and slot.
fn split_name(name: &str) -> Result<(&str, usize)> {
    let slot = match name.rsplit_once('_') {
        Some((layer, "filters" | "weights")) if !layer.is_empty() => (layer, WEIGHTS),
        Some((layer, "biases")) if !layer.is_empty() => (layer, BIASES),
        _ => {
            return Err(NetErr::Pretrained(format!(
                "tensor {name} is not named <layer>_filters, <layer>_weights or <layer>_biases"
            )));
        }
    };

    Ok(slot)
}
