pub mod config;
pub mod labels;
pub mod model;
pub mod preprocess;

pub use config::{DetectorConfig, ModelConfig, Normalization, PreprocessConfig};
pub use labels::ClassLabels;
pub use model::{load_classifier, ClassProbability, Classifier, PredictionResult};
pub use preprocess::{ImageTensor, Preprocessor};
