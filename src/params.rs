use std::{
    collections::{BTreeMap, btree_map::Entry},
    fmt::{self, Display},
};

use ndarray::ArrayD;

use crate::pretrained::PretrainedWeights;

/// Slot of a layer's weights or filters.
pub const WEIGHTS: usize = 0;
/// Slot of a layer's biases.
pub const BIASES: usize = 1;

/// Identifies a parameter by the layer it belongs to and its slot within that layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamKey {
    pub layer: String,
    pub slot: usize,
}

impl ParamKey {
    pub fn new(layer: impl Into<String>, slot: usize) -> Self {
        Self {
            layer: layer.into(),
            slot,
        }
    }
}

impl Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.layer, self.slot)
    }
}

/// What kind of layer owns a parameter, it decides the parameter's display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Conv,
    Fc,
}

impl LayerKind {
    /// Returns the suffix of the given slot's display name.
    pub fn suffix(self, slot: usize) -> &'static str {
        match (self, slot) {
            (_, BIASES) => "biases",
            (LayerKind::Conv, _) => "filters",
            (LayerKind::Fc, _) => "weights",
        }
    }
}

/// A learnable array together with its display name, e.g. `conv1_filters`.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    value: ArrayD<f32>,
}

impl Param {
    pub fn new(name: String, value: ArrayD<f32>) -> Self {
        Self {
            name,
            value: value.as_standard_layout().into_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    /// The scalars of the parameter in row major order, as optimizers update them.
    pub(crate) fn values_mut(&mut self) -> &mut [f32] {
        if !self.value.is_standard_layout() {
            self.value = self.value.as_standard_layout().into_owned();
        }

        self.value.as_slice_mut().unwrap_or_default()
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// Returns the amount of scalars in this parameter.
    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }
}

/// The flat registry of every materialized parameter.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    params: BTreeMap<ParamKey, Param>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new parameter.
    ///
    /// # Arguments
    /// * `key` - The parameter's identity.
    /// * `param` - The parameter itself.
    ///
    /// # Returns
    /// The given parameter back if the key was already taken.
    pub fn register(&mut self, key: ParamKey, param: Param) -> Result<(), Param> {
        match self.params.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(param);
                Ok(())
            }
            Entry::Occupied(_) => Err(param),
        }
    }

    pub fn get(&self, key: &ParamKey) -> Option<&Param> {
        self.params.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &ParamKey) -> Option<&mut Param> {
        self.params.get_mut(key)
    }

    pub fn value(&self, layer: &str, slot: usize) -> Option<&ArrayD<f32>> {
        self.get(&ParamKey::new(layer, slot)).map(Param::value)
    }

    pub fn contains(&self, key: &ParamKey) -> bool {
        self.params.contains_key(key)
    }

    /// Iterates the parameters ordered by layer name and slot.
    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &Param)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the total amount of scalars across every registered parameter.
    pub fn count(&self) -> usize {
        self.params.values().map(Param::size).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.params.clear();
    }

    /// Removes every parameter of the given layer.
    pub(crate) fn remove_layer(&mut self, layer: &str) {
        self.params.retain(|key, _| key.layer != layer);
    }

    /// Copies the registry into a pretrained mapping, layers with a missing slot are skipped.
    pub fn to_pretrained(&self) -> PretrainedWeights {
        let mut pretrained = PretrainedWeights::new();

        for (key, weights) in self.params.iter().filter(|(k, _)| k.slot == WEIGHTS) {
            let Some(biases) = self.value(&key.layer, BIASES) else {
                continue;
            };

            pretrained.insert(&key.layer, weights.value().clone(), biases.clone());
        }

        pretrained
    }
}
