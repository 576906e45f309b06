pub mod builder;
pub mod defaults;
pub mod explain;
pub(crate) mod model_runtime;
pub mod runtime;
pub mod slot;
pub mod traits;

pub use model_runtime::CandleClassifier;
