pub mod activation_functions;
pub mod config;
pub mod data;
pub mod error;
pub mod helpers;
pub mod layer;
pub mod loss_functions;
pub mod metrics;
pub mod mlp;
pub mod optimizer;
pub mod training;

pub use candle_core::Tensor;
pub use error::{Error, Result};
pub use mlp::Sequential;
pub use training::Model;
