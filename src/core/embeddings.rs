use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use ndarray::{ArrayD, ArrayView4};

use crate::core::preprocess::CanonicalTensor;
use crate::error::{AppError, Result};

#[cfg(feature = "embeddings")]
pub use self::onnx::{load_extractor, OnnxSession};

/// Name and shape of a model input or output, as declared by the model.
///
/// Non-positive dimensions are dynamic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    /// Tensor name in the model graph
    pub name: String,
    /// Declared shape
    pub shape: Vec<i64>,
}

impl TensorSpec {
    /// Create a spec
    pub fn new<S: Into<String>>(name: S, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    fn dim_matches(declared: i64, actual: usize) -> bool {
        declared <= 0 || declared as usize == actual
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .shape
            .iter()
            .map(|d| if *d > 0 { d.to_string() } else { "?".to_string() })
            .collect();
        write!(f, "{}: {}", self.name, dims.join("x"))
    }
}

/// A loaded inference session over a pretrained image encoder.
///
/// `run` must not mutate observable state: the same input always yields
/// the same output. Implementations that cannot run concurrently must
/// serialize internally.
pub trait InferenceSession: Send + Sync {
    /// The single image input, from model metadata
    fn input(&self) -> &TensorSpec;

    /// The embedding output, from model metadata
    fn output(&self) -> &TensorSpec;

    /// Feed `input` to the model and return the embedding output tensor
    fn run(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>>;
}

/// Owns an [`InferenceSession`] and turns canonical tensors into raw embeddings.
///
/// Build once per run and share it across workers. Dropping it (or calling
/// [`EmbeddingExtractor::close`]) releases the session.
pub struct EmbeddingExtractor {
    session: Box<dyn InferenceSession>,
    input_shape: [usize; 4],
    dimension: OnceLock<usize>,
}

impl fmt::Debug for EmbeddingExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingExtractor")
            .field("input", self.session.input())
            .field("output", self.session.output())
            .field("dimension", &self.dimension.get())
            .finish()
    }
}

impl EmbeddingExtractor {
    /// Wrap `session`, checking its metadata against the tensors it will be fed.
    ///
    /// `input_shape` is the preprocessor's output shape. The model input must
    /// be rank 4 with every static dimension equal to it, and the output must
    /// be `[D]` or `[1, D]`.
    pub fn new(session: Box<dyn InferenceSession>, input_shape: [usize; 4]) -> Result<Self> {
        let input = session.input();
        if input.shape.len() != 4
            || !input
                .shape
                .iter()
                .zip(input_shape.iter())
                .all(|(declared, actual)| TensorSpec::dim_matches(*declared, *actual))
        {
            return Err(AppError::ModelLoad(format!(
                "model input {} does not accept tensors of shape {:?}",
                input, input_shape
            )));
        }

        let output = session.output();
        let declared_dim = match output.shape.as_slice() {
            [d] => *d,
            [batch, d] if TensorSpec::dim_matches(*batch, 1) => *d,
            _ => {
                return Err(AppError::ModelLoad(format!(
                    "model output {} is not a single embedding vector",
                    output
                )))
            }
        };

        let dimension = OnceLock::new();
        if declared_dim > 0 {
            let _ = dimension.set(declared_dim as usize);
        }

        log::debug!("Embedding extractor ready ({} -> {})", input, output);

        Ok(Self {
            session,
            input_shape,
            dimension,
        })
    }

    /// Embedding length, once known from metadata or the first extraction
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    /// Shape of the tensors this extractor accepts
    pub fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    /// Run the model on one canonical tensor and return the raw embedding.
    ///
    /// Outputs of the wrong rank or length, or containing non-finite values,
    /// fail with [`AppError::Inference`].
    pub fn extract(&self, tensor: &CanonicalTensor) -> Result<Vec<f32>> {
        if tensor.shape() != self.input_shape {
            return Err(AppError::Config(format!(
                "tensor shape {:?} does not match extractor input {:?}",
                tensor.shape(),
                self.input_shape
            )));
        }

        let output = self.session.run(tensor.view())?;

        let embedding: Vec<f32> = match output.shape() {
            [_] | [1, _] => output.iter().copied().collect(),
            shape => {
                return Err(AppError::Inference(format!(
                    "unexpected output shape {:?}",
                    shape
                )))
            }
        };

        if embedding.is_empty() {
            return Err(AppError::Inference("model returned an empty embedding".to_string()));
        }

        let expected = *self.dimension.get_or_init(|| embedding.len());
        if embedding.len() != expected {
            return Err(AppError::Inference(format!(
                "expected an embedding of length {}, got {}",
                expected,
                embedding.len()
            )));
        }

        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Inference(
                "model returned non-finite values".to_string(),
            ));
        }

        Ok(embedding)
    }

    /// Release the session now instead of at end of scope
    pub fn close(self) {
        log::debug!("Closing embedding extractor");
        drop(self);
    }
}

/// Run a blocking `loader` off the async runtime, giving up after `timeout`.
///
/// The load itself cannot be interrupted; on timeout it finishes in the
/// background and its result is discarded.
pub async fn load_with_timeout<F>(timeout: Duration, loader: F) -> Result<EmbeddingExtractor>
where
    F: FnOnce() -> Result<EmbeddingExtractor> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(loader);
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => Err(AppError::ModelLoad(format!(
            "model load timed out after {}s",
            timeout.as_secs_f32()
        ))),
    }
}

#[cfg(feature = "embeddings")]
mod onnx {
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use ndarray::{ArrayD, ArrayView4};
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::{Tensor, ValueType};

    use super::{load_with_timeout, EmbeddingExtractor, InferenceSession, TensorSpec};
    use crate::config::Config;
    use crate::core::preprocess::Preprocessor;
    use crate::error::{AppError, Result};

    /// ONNX Runtime session over an image encoder.
    ///
    /// `ort` needs exclusive access to run, so calls are serialized.
    pub struct OnnxSession {
        session: Mutex<Session>,
        input: TensorSpec,
        output: TensorSpec,
        model_name: String,
    }

    impl OnnxSession {
        /// Load a model from disk
        pub fn load<P: AsRef<Path>>(path: P, intra_threads: Option<usize>) -> Result<Self> {
            let path = path.as_ref();
            if !path.is_file() {
                return Err(AppError::ModelLoad(format!(
                    "model not found at {}",
                    path.display()
                )));
            }

            let model_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            log::info!("Loading model {}", path.display());

            let mut builder = Session::builder()
                .map_err(|e| load_error(&model_name, e))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| load_error(&model_name, e))?;
            if let Some(threads) = intra_threads {
                builder = builder
                    .with_intra_threads(threads)
                    .map_err(|e| load_error(&model_name, e))?;
            }
            let session = builder
                .commit_from_file(path)
                .map_err(|e| load_error(&model_name, e))?;

            let input = session
                .inputs
                .first()
                .ok_or_else(|| AppError::ModelLoad(format!("{} declares no inputs", model_name)))
                .and_then(|i| tensor_spec(&i.name, &i.input_type))?;
            let output = session
                .outputs
                .first()
                .ok_or_else(|| AppError::ModelLoad(format!("{} declares no outputs", model_name)))
                .and_then(|o| tensor_spec(&o.name, &o.output_type))?;

            log::info!("Model loaded: {}", model_name);
            log::info!("Model input: {}", input);
            log::info!("Model output: {}", output);

            Ok(Self {
                session: Mutex::new(session),
                input,
                output,
                model_name,
            })
        }
    }

    fn load_error<E: std::fmt::Display>(model_name: &str, e: E) -> AppError {
        AppError::ModelLoad(format!("{}: {}", model_name, e))
    }

    fn tensor_spec(name: &str, value_type: &ValueType) -> Result<TensorSpec> {
        let shape = value_type
            .tensor_shape()
            .ok_or_else(|| AppError::ModelLoad(format!("{} is not a tensor", name)))?;
        Ok(TensorSpec::new(name, shape.iter().copied().collect()))
    }

    impl InferenceSession for OnnxSession {
        fn input(&self) -> &TensorSpec {
            &self.input
        }

        fn output(&self) -> &TensorSpec {
            &self.output
        }

        fn run(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
            let tensor = Tensor::from_array(input.to_owned())
                .map_err(|e| AppError::Inference(format!("Failed to create input tensor: {}", e)))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| AppError::Internal("inference session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![self.input.name.as_str() => tensor])
                .map_err(|e| AppError::Inference(format!("ONNX inference failed: {}", e)))?;

            let output = outputs.get(self.output.name.as_str()).ok_or_else(|| {
                AppError::Inference(format!("output '{}' missing from results", self.output.name))
            })?;

            let array = output
                .try_extract_array::<f32>()
                .map_err(|e| AppError::Inference(format!("Failed to extract output: {}", e)))?;

            Ok(array.to_owned())
        }
    }

    impl std::fmt::Debug for OnnxSession {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OnnxSession")
                .field("model", &self.model_name)
                .field("input", &self.input)
                .field("output", &self.output)
                .finish()
        }
    }

    impl Drop for OnnxSession {
        fn drop(&mut self) {
            log::debug!("Releasing inference session for {}", self.model_name);
        }
    }

    /// Load the configured visual encoder, giving up after `model.load_timeout_secs`.
    pub async fn load_extractor(config: &Config) -> Result<EmbeddingExtractor> {
        let path = config.model.visual_model_path();
        let threads = config.model.intra_threads;
        let input_shape = Preprocessor::new(&config.preprocess).output_shape();
        let timeout = Duration::from_secs(config.model.load_timeout_secs);

        load_with_timeout(timeout, move || {
            let session = OnnxSession::load(path, threads)?;
            EmbeddingExtractor::new(Box::new(session), input_shape)
        })
        .await
    }
}
