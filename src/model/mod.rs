pub mod classifier_net;
pub mod scaler;

pub use classifier_net::ClassifierArchitecture;
pub use scaler::{FeatureScaler, ScalerState, SCALER_STD_FLOOR};
