#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::Arc;

use deepcheck_kernel_contracts::classify::{BackboneId, ClassificationOutcome};
use deepcheck_kernel_contracts::history::Prediction;
use deepcheck_kernel_contracts::ContractViolation;

/// Output index the pretrained heads use for the "Fake" class.
pub const FAKE_CLASS_INDEX: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("failed to decode image {path}: {reason}")]
    ImageDecode { path: String, reason: String },
    #[error("inference transport error ({kind})")]
    Transport { kind: &'static str },
    #[error("inference endpoint returned http {0}")]
    HttpStatus(u16),
    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
    #[error("classifier misconfigured: {0}")]
    Misconfigured(String),
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

/// Binary real/fake image classifier. Implementations differ only in the
/// backbone they front; callers never depend on which one is mounted.
pub trait Classifier: Send + Sync {
    fn backbone(&self) -> BackboneId;

    /// Initialization work run while a session is loading.
    fn warm_up(&self) -> Result<(), ClassifierError> {
        Ok(())
    }

    fn predict(&self, image_path: &Path) -> Result<ClassificationOutcome, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for Arc<C> {
    fn backbone(&self) -> BackboneId {
        (**self).backbone()
    }

    fn warm_up(&self) -> Result<(), ClassifierError> {
        (**self).warm_up()
    }

    fn predict(&self, image_path: &Path) -> Result<ClassificationOutcome, ClassifierError> {
        (**self).predict(image_path)
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn backbone(&self) -> BackboneId {
        (**self).backbone()
    }

    fn warm_up(&self) -> Result<(), ClassifierError> {
        (**self).warm_up()
    }

    fn predict(&self, image_path: &Path) -> Result<ClassificationOutcome, ClassifierError> {
        (**self).predict(image_path)
    }
}

/// Stand-in mounted when no inference backend is configured. Account
/// operations still work; loading and prediction report `Misconfigured`.
#[derive(Debug, Clone)]
pub struct UnconfiguredClassifier {
    backbone: BackboneId,
    reason: String,
}

impl UnconfiguredClassifier {
    pub fn new(backbone: BackboneId, reason: impl Into<String>) -> Self {
        Self {
            backbone,
            reason: reason.into(),
        }
    }
}

impl Classifier for UnconfiguredClassifier {
    fn backbone(&self) -> BackboneId {
        self.backbone
    }

    fn warm_up(&self) -> Result<(), ClassifierError> {
        Err(ClassifierError::Misconfigured(self.reason.clone()))
    }

    fn predict(&self, _image_path: &Path) -> Result<ClassificationOutcome, ClassifierError> {
        Err(ClassifierError::Misconfigured(self.reason.clone()))
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Softmax over the logits, then argmax. Index 1 is Fake, anything else Real;
/// the winning probability is the confidence. Ties keep the lower index.
pub fn decide(logits: &[f32]) -> Result<ClassificationOutcome, ClassifierError> {
    if logits.len() < 2 {
        return Err(ClassifierError::MalformedResponse(format!(
            "expected at least 2 logits, got {}",
            logits.len()
        )));
    }
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(ClassifierError::MalformedResponse(
            "logits must be finite".to_string(),
        ));
    }
    let probs = softmax(logits);
    let (best_idx, best_p) = probs
        .iter()
        .copied()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(bi, bp), (i, p)| {
            if p > bp {
                (i, p)
            } else {
                (bi, bp)
            }
        });
    let prediction = if best_idx == FAKE_CLASS_INDEX {
        Prediction::Fake
    } else {
        Prediction::Real
    };
    let confidence = f64::from(best_p).clamp(0.0, 1.0);
    Ok(ClassificationOutcome::new(prediction, confidence)?)
}
