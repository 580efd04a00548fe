mod alexnet;
mod endpoints;
pub mod layers;
pub mod ops;

pub use alexnet::{
    AlexNet, BASE_LEARNING_RATE, FINETUNE_LEARNING_RATE, INIT_STD_DEV, KEEP_PROB,
};
pub use endpoints::{BaseEndpoints, FinetuneEndpoints, Head, Objective, OptimizerStep};
