use std::collections::BTreeMap;

use crate::{NetErr, Result, params::ParamKey};

/// Defines the strategy for updating parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using the gradient.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the loss with respect to `params`.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}

/// Keeps one optimizer per parameter so that stateful optimizers track each array on its own.
pub struct OptimizerSlots<O> {
    slots: BTreeMap<ParamKey, O>,
    factory: Box<dyn Fn(usize) -> O + Send>,
}

impl<O: Optimizer> OptimizerSlots<O> {
    /// Creates a new `OptimizerSlots`.
    ///
    /// # Arguments
    /// * `factory` - Creates the optimizer of a parameter given its size, called on first use.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(usize) -> O + Send + 'static,
    {
        Self {
            slots: BTreeMap::new(),
            factory: Box::new(factory),
        }
    }

    /// Updates one parameter with the optimizer that belongs to its key.
    pub fn update(&mut self, key: &ParamKey, grad: &[f32], params: &mut [f32]) -> Result<()> {
        let factory = &self.factory;
        let optimizer = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| factory(params.len()));

        optimizer.update_params(grad, params)
    }

    /// Drops the state of every slot.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub(super) fn check_sizes(grad: &[f32], params: &[f32]) -> Result<()> {
    if grad.len() != params.len() {
        return Err(NetErr::SizeMismatch {
            what: "optimizer gradient",
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::Adam;

    #[test]
    fn one_optimizer_per_key() {
        let mut slots = OptimizerSlots::new(|len| Adam::with_defaults(len, 0.01));
        let mut w = [0.; 4];
        let mut b = [0.; 2];

        slots
            .update(&ParamKey::new("fc8", 0), &[1.; 4], &mut w)
            .unwrap();
        slots
            .update(&ParamKey::new("fc8", 1), &[1.; 2], &mut b)
            .unwrap();
        slots
            .update(&ParamKey::new("fc8", 0), &[1.; 4], &mut w)
            .unwrap();

        assert_eq!(slots.len(), 2);
        assert!(w[0] < b[0]);
    }

    #[test]
    fn slot_keeps_its_size() {
        let mut slots = OptimizerSlots::new(|len| Adam::with_defaults(len, 0.01));
        let key = ParamKey::new("fc8", 0);

        slots.update(&key, &[1.; 4], &mut [0.; 4]).unwrap();
        assert!(slots.update(&key, &[1.; 3], &mut [0.; 3]).is_err());
    }
}
