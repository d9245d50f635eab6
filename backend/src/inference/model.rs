use crate::error::{InferenceError, ModelError};
use crate::inference::config::ModelConfig;
use crate::inference::preprocess::ImageTensor;
use serde::Serialize;
use std::sync::Arc;

/// Softmax outputs may overshoot [0, 1] by a rounding error.
const PROBABILITY_TOLERANCE: f32 = 1e-4;
/// Allowed drift of the total mass away from 1.0.
const SUM_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassProbability {
    pub class_index: usize,
    pub probability: f32,
}

/// Categorical distribution over the network's output classes.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    classes: Vec<ClassProbability>,
}

impl PredictionResult {
    pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Self, InferenceError> {
        if probabilities.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }

        let classes = probabilities
            .into_iter()
            .enumerate()
            .map(|(class_index, value)| {
                let in_range = (-PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE).contains(&value);
                if !value.is_finite() || !in_range {
                    return Err(InferenceError::InvalidProbability { class_index, value });
                }
                Ok(ClassProbability {
                    class_index,
                    probability: value.clamp(0.0, 1.0),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sum: f32 = classes.iter().map(|c| c.probability).sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(InferenceError::NotADistribution { sum });
        }

        Ok(Self { classes })
    }

    /// Highest-probability class. Ties resolve to the lowest index.
    pub fn top(&self) -> ClassProbability {
        let mut best = self.classes[0];
        for class in &self.classes[1..] {
            if class.probability > best.probability {
                best = *class;
            }
        }
        best
    }

    pub fn classes(&self) -> &[ClassProbability] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A loaded, read-only image classification network.
pub trait Classifier: Send + Sync {
    /// NHWC shape the network accepts.
    fn input_shape(&self) -> [usize; 4];

    fn classify(&self, tensor: &ImageTensor) -> Result<PredictionResult, InferenceError>;

    fn describe(&self) -> String;
}

pub fn ensure_input_shape(expected: [usize; 4], tensor: &ImageTensor) -> Result<(), InferenceError> {
    if tensor.shape() != expected {
        return Err(InferenceError::ShapeMismatch {
            expected,
            actual: tensor.shape().to_vec(),
        });
    }
    Ok(())
}

/// Loads the configured network once, at startup.
pub fn load_classifier(
    config: &ModelConfig,
    input_shape: [usize; 4],
) -> Result<Arc<dyn Classifier>, ModelError> {
    if !config.path.exists() {
        return Err(ModelError::NotFound(config.path.clone()));
    }

    #[cfg(feature = "torch")]
    {
        let classifier = torch::TorchClassifier::load(config, input_shape)?;
        log::info!("Loaded {}", classifier.describe());
        Ok(Arc::new(classifier))
    }

    #[cfg(not(feature = "torch"))]
    {
        let _ = input_shape;
        Err(ModelError::BackendUnavailable)
    }
}

#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[cfg(feature = "torch")]
mod torch {
    use super::{ensure_input_shape, Classifier, PredictionResult};
    use crate::error::{InferenceError, ModelError};
    use crate::inference::config::{DeviceKind, ModelConfig, ModelFormat, ModelOutput};
    use crate::inference::preprocess::ImageTensor;
    use std::sync::Mutex;
    use tch::nn::{self, ModuleT};
    use tch::{CModule, Device, Kind, TchError, Tensor};

    impl From<TchError> for InferenceError {
        fn from(err: TchError) -> Self {
            InferenceError::Runtime(err.to_string())
        }
    }

    enum Network {
        Script(CModule),
        ResNet50 {
            net: nn::FuncT<'static>,
            _vs: nn::VarStore,
        },
    }

    impl Network {
        fn forward(&self, xs: &Tensor) -> Result<Tensor, TchError> {
            match self {
                Network::Script(module) => module.forward_ts(&[xs]),
                Network::ResNet50 { net, .. } => Ok(net.forward_t(xs, false)),
            }
        }
    }

    pub struct TorchClassifier {
        network: Mutex<Network>,
        device: Device,
        input_shape: [usize; 4],
        channels_last: bool,
        output: ModelOutput,
        description: String,
    }

    fn resolve_device(kind: DeviceKind) -> Device {
        match kind {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => Device::Cuda(0),
            DeviceKind::Auto => Device::cuda_if_available(),
        }
    }

    impl TorchClassifier {
        pub fn load(config: &ModelConfig, input_shape: [usize; 4]) -> Result<Self, ModelError> {
            let device = resolve_device(config.device);
            let load_err = |e: TchError| ModelError::Load(format!("{}: {}", config.path.display(), e));

            let network = match config.format {
                ModelFormat::TorchScript => {
                    let mut module = CModule::load_on_device(&config.path, device).map_err(load_err)?;
                    module.set_eval();
                    Network::Script(module)
                }
                ModelFormat::ResNet50 => {
                    let mut vs = nn::VarStore::new(device);
                    let net = tch::vision::resnet::resnet50(&vs.root(), config.num_classes);
                    vs.load(&config.path).map_err(load_err)?;
                    Network::ResNet50 { net, _vs: vs }
                }
            };

            Ok(Self {
                network: Mutex::new(network),
                device,
                input_shape,
                channels_last: config.channels_last,
                output: config.output,
                description: format!(
                    "{:?} model {} on {:?}",
                    config.format,
                    config.path.display(),
                    device
                ),
            })
        }

        /// Randomly initialised ResNet50, for exercising the adapter without weights.
        #[cfg(test)]
        pub(crate) fn untrained_resnet50(num_classes: i64) -> Self {
            tch::manual_seed(0);
            let vs = nn::VarStore::new(Device::Cpu);
            let net = tch::vision::resnet::resnet50(&vs.root(), num_classes);
            Self {
                network: Mutex::new(Network::ResNet50 { net, _vs: vs }),
                device: Device::Cpu,
                input_shape: [1, 224, 224, 3],
                channels_last: false,
                output: ModelOutput::Logits,
                description: "untrained resnet50".to_string(),
            }
        }

        fn to_input(&self, tensor: &ImageTensor) -> Result<Tensor, TchError> {
            let data: Vec<f32> = tensor.view().iter().copied().collect();
            let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
            let xs = Tensor::from_slice(&data).f_reshape(shape.as_slice())?;
            let xs = if self.channels_last {
                xs
            } else {
                xs.f_permute(&[0i64, 3, 1, 2][..])?.contiguous()
            };
            Ok(xs.to_device(self.device))
        }
    }

    impl Classifier for TorchClassifier {
        fn input_shape(&self) -> [usize; 4] {
            self.input_shape
        }

        fn classify(&self, tensor: &ImageTensor) -> Result<PredictionResult, InferenceError> {
            ensure_input_shape(self.input_shape, tensor)?;
            let xs = self.to_input(tensor)?;

            let output = {
                let network = self.network.lock().map_err(|_| InferenceError::Poisoned)?;
                tch::no_grad(|| network.forward(&xs))?
            };

            let probs = match self.output {
                ModelOutput::Logits => output.f_softmax(-1, Kind::Float)?,
                ModelOutput::Probabilities => output.f_to_kind(Kind::Float)?,
            };
            let flat = probs.f_reshape(&[-1i64][..])?.to_device(Device::Cpu);
            let values = Vec::<f32>::try_from(&flat)?;
            PredictionResult::from_probabilities(values)
        }

        fn describe(&self) -> String {
            self.description.clone()
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn top_picks_the_first_maximum() {
        let result = PredictionResult::from_probabilities(vec![0.1, 0.4, 0.4, 0.1]).unwrap();
        let top = result.top();
        assert_eq!(top.class_index, 1);
        assert!((top.probability - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_empty_and_invalid_outputs() {
        assert!(matches!(
            PredictionResult::from_probabilities(vec![]),
            Err(InferenceError::EmptyOutput)
        ));
        assert!(matches!(
            PredictionResult::from_probabilities(vec![0.5, f32::NAN]),
            Err(InferenceError::InvalidProbability { class_index: 1, .. })
        ));
        assert!(matches!(
            PredictionResult::from_probabilities(vec![1.5, -0.5]),
            Err(InferenceError::InvalidProbability { class_index: 0, .. })
        ));
    }

    #[test]
    fn rejects_scores_that_do_not_sum_to_one() {
        match PredictionResult::from_probabilities(vec![0.9, 0.9, 0.9]) {
            Err(InferenceError::NotADistribution { sum }) => assert!((sum - 2.7).abs() < 1e-4),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            PredictionResult::from_probabilities(vec![0.2, 0.3]),
            Err(InferenceError::NotADistribution { .. })
        ));
        assert!(PredictionResult::from_probabilities(vec![0.2, 0.3, 0.5]).is_ok());
    }

    #[test]
    fn rounding_overshoot_is_clamped() {
        let result = PredictionResult::from_probabilities(vec![1.00001, 0.0]).unwrap();
        assert_eq!(result.top().probability, 1.0);
    }

    #[test]
    fn shape_guard() {
        let good = ImageTensor::new(Array4::zeros((1, 224, 224, 3)));
        assert!(ensure_input_shape([1, 224, 224, 3], &good).is_ok());

        let batch_of_two = ImageTensor::new(Array4::zeros((2, 224, 224, 3)));
        match ensure_input_shape([1, 224, 224, 3], &batch_of_two) {
            Err(InferenceError::ShapeMismatch { actual, .. }) => assert_eq!(actual, vec![2, 224, 224, 3]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_model_file_is_reported() {
        let config = ModelConfig {
            path: "models/nope.ot".into(),
            ..ModelConfig::default()
        };
        assert!(matches!(
            load_classifier(&config, [1, 224, 224, 3]),
            Err(ModelError::NotFound(_))
        ));
    }
}
