#![forbid(unsafe_code)]

pub mod classifier;
pub mod preprocess;
pub mod remote;

pub use classifier::{Classifier, ClassifierError, UnconfiguredClassifier};
pub use remote::{RemoteInferenceClassifier, RemoteInferenceConfig};
