use futures_util::future::BoxFuture;
use serde::Deserialize;
use slide_capture_common::frame::{Frame, FrameError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A learned binary classifier over a pair of same-sized small frames.
pub trait TransitionModel: Send + Sync {
    /// Probability that `after` shows different content than `before`.
    fn probability(&self, before: &Frame, after: &Frame) -> Result<f32, ClassifierError>;
}

/// Produces a model on first use. Loading may touch the filesystem or network.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn TransitionModel>, ClassifierError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("failed to read model weights {0}: {1}")]
    Io(String, std::io::Error),
    #[error("failed to parse model weights: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model expects {expected} weights, got {got}")]
    Shape { expected: usize, got: usize },
    #[error("weights are for {got}x{got} inputs, classifier is configured for {expected}x{expected}")]
    InputSize { expected: u32, got: u32 },
    #[error("frame preparation failed: {0}")]
    Frame(#[from] FrameError),
}

/// Optional third vote for the decision engine.
///
/// The model is loaded lazily on the first vote, at most once: concurrent
/// callers wait on the same load, and a failed load is remembered so it is not
/// retried every tick. Every failure path yields `None` ("no vote").
pub struct TransitionClassifier {
    loader: Option<Arc<dyn ModelLoader>>,
    model: OnceCell<Option<Arc<dyn TransitionModel>>>,
    input_size: u32,
    threshold: f32,
}

impl TransitionClassifier {
    pub fn new(loader: Arc<dyn ModelLoader>, input_size: u32, threshold: f32) -> Self {
        Self {
            loader: Some(loader),
            model: OnceCell::new(),
            input_size,
            threshold,
        }
    }

    /// A classifier that never votes.
    pub fn disabled() -> Self {
        Self {
            loader: None,
            model: OnceCell::new(),
            input_size: 32,
            threshold: 0.5,
        }
    }

    /// True once a model has been loaded successfully.
    pub fn is_available(&self) -> bool {
        matches!(self.model.get(), Some(Some(_)))
    }

    async fn model(&self) -> Option<Arc<dyn TransitionModel>> {
        let loader = self.loader.as_ref()?;
        self.model
            .get_or_init(|| async {
                match loader.load().await {
                    Ok(model) => {
                        info!(input_size = self.input_size, "transition classifier loaded");
                        Some(model)
                    }
                    Err(e) => {
                        warn!(error = %e, "transition classifier unavailable, continuing without it");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// `Some(true)` when the model thinks the content changed, `None` when it
    /// cannot vote.
    pub async fn vote(&self, before: &Frame, after: &Frame) -> Option<bool> {
        let model = self.model().await?;
        let size = self.input_size;
        let result = before
            .resized(size, size)
            .and_then(|a| Ok((a, after.resized(size, size)?)))
            .map_err(ClassifierError::from)
            .and_then(|(a, b)| model.probability(&a, &b));

        match result {
            Ok(p) => {
                debug!(probability = p, threshold = self.threshold, "classifier vote");
                Some(p > self.threshold)
            }
            Err(e) => {
                debug!(error = %e, "classifier abstained");
                None
            }
        }
    }
}

/// Logistic model over per-pixel brightness differences of the two inputs.
pub struct LinearDiffModel {
    input_size: u32,
    weights: Vec<f32>,
    bias: f32,
}

#[derive(Debug, Deserialize)]
struct WeightsFile {
    input_size: u32,
    weights: Vec<f32>,
    #[serde(default)]
    bias: f32,
}

impl LinearDiffModel {
    pub fn new(input_size: u32, weights: Vec<f32>, bias: f32) -> Result<Self, ClassifierError> {
        let expected = (input_size * input_size) as usize;
        if weights.len() != expected {
            return Err(ClassifierError::Shape {
                expected,
                got: weights.len(),
            });
        }
        Ok(Self {
            input_size,
            weights,
            bias,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let file: WeightsFile = serde_json::from_str(json)?;
        Self::new(file.input_size, file.weights, file.bias)
    }
}

impl TransitionModel for LinearDiffModel {
    fn probability(&self, before: &Frame, after: &Frame) -> Result<f32, ClassifierError> {
        let expected = (self.input_size * self.input_size) as usize;
        for frame in [before, after] {
            if frame.pixel_count() != expected {
                return Err(ClassifierError::Shape {
                    expected,
                    got: frame.pixel_count(),
                });
            }
        }

        let mut logit = self.bias;
        let mut i = 0;
        for y in 0..self.input_size {
            for x in 0..self.input_size {
                let a = before.brightness_at(x, y) as f32;
                let b = after.brightness_at(x, y) as f32;
                logit += self.weights[i] * (a - b).abs() / 255.0;
                i += 1;
            }
        }
        Ok(1.0 / (1.0 + (-logit).exp()))
    }
}

/// Loads [`LinearDiffModel`] weights from a JSON file. The file must be
/// trained for the configured input size.
pub struct JsonWeightsLoader {
    path: PathBuf,
    input_size: u32,
}

impl JsonWeightsLoader {
    pub fn new(path: PathBuf, input_size: u32) -> Self {
        Self { path, input_size }
    }
}

impl ModelLoader for JsonWeightsLoader {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn TransitionModel>, ClassifierError>> {
        Box::pin(async move {
            let json = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| ClassifierError::Io(self.path.display().to_string(), e))?;
            let model = LinearDiffModel::from_json(&json)?;
            if model.input_size != self.input_size {
                return Err(ClassifierError::InputSize {
                    expected: self.input_size,
                    got: model.input_size,
                });
            }
            debug!(path = self.path.display().to_string(), "read classifier weights");
            Ok(Arc::new(model) as Arc<dyn TransitionModel>)
        })
    }
}
