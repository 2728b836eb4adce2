#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::history::{Confidence, Prediction};
use crate::{ContractViolation, Validate};

/// Pretrained model families the classifier can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackboneId {
    #[serde(rename = "vit-224")]
    Vit224,
    #[serde(rename = "efficientnet-224")]
    EfficientNet224,
    #[serde(rename = "xception-299")]
    Xception299,
}

impl BackboneId {
    pub fn as_str(self) -> &'static str {
        match self {
            BackboneId::Vit224 => "vit-224",
            BackboneId::EfficientNet224 => "efficientnet-224",
            BackboneId::Xception299 => "xception-299",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vit-224" | "vit" => Some(BackboneId::Vit224),
            "efficientnet-224" | "efficientnet" => Some(BackboneId::EfficientNet224),
            "xception-299" | "xception" => Some(BackboneId::Xception299),
            _ => None,
        }
    }

    pub fn allowed_names() -> [&'static str; 3] {
        ["vit-224", "efficientnet-224", "xception-299"]
    }

    pub fn profile(self) -> PreprocessProfile {
        match self {
            BackboneId::Vit224 => PreprocessProfile {
                backbone: self,
                width: 224,
                height: 224,
                mean: [0.5, 0.5, 0.5],
                std: [0.5, 0.5, 0.5],
            },
            BackboneId::EfficientNet224 => PreprocessProfile {
                backbone: self,
                width: 224,
                height: 224,
                mean: [0.485, 0.456, 0.406],
                std: [0.229, 0.224, 0.225],
            },
            BackboneId::Xception299 => PreprocessProfile {
                backbone: self,
                width: 299,
                height: 299,
                mean: [0.5, 0.5, 0.5],
                std: [0.5, 0.5, 0.5],
            },
        }
    }
}

/// Input geometry and per-channel normalization for one backbone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessProfile {
    pub backbone: BackboneId,
    pub width: u32,
    pub height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl PreprocessProfile {
    pub fn tensor_len(&self) -> usize {
        3 * self.width as usize * self.height as usize
    }
}

impl Validate for PreprocessProfile {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.width == 0 || self.height == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "preprocess_profile.size",
                reason: "width and height must be > 0",
            });
        }
        for s in self.std {
            if !s.is_finite() || s <= 0.0 {
                return Err(ContractViolation::InvalidValue {
                    field: "preprocess_profile.std",
                    reason: "must be finite and > 0",
                });
            }
        }
        for m in self.mean {
            if !m.is_finite() {
                return Err(ContractViolation::NotFinite {
                    field: "preprocess_profile.mean",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationOutcome {
    pub prediction: Prediction,
    pub confidence: Confidence,
}

impl ClassificationOutcome {
    pub fn new(prediction: Prediction, confidence: f64) -> Result<Self, ContractViolation> {
        Ok(Self {
            prediction,
            confidence: Confidence::new(confidence)?,
        })
    }
}
