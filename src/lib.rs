pub mod arch;
pub mod config;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod params;
pub mod pretrained;

pub use arch::{AlexNet, BaseEndpoints, FinetuneEndpoints, Head, Objective, OptimizerStep};
pub use config::NetConfig;
pub use error::{NetErr, Result};
pub use params::{Param, ParamKey, ParamStore};
pub use pretrained::PretrainedWeights;
