#![forbid(unsafe_code)]

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use deepcheck_kernel_contracts::classify::{BackboneId, ClassificationOutcome, PreprocessProfile};
use deepcheck_kernel_contracts::Validate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::classifier::{decide, Classifier, ClassifierError};
use crate::preprocess::{preprocess_path, ImageTensor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInferenceConfig {
    pub endpoint: String,
    pub bearer_token: Option<String>,
    pub timeout_ms: u32,
}

impl RemoteInferenceConfig {
    pub fn mvp_v1(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bearer_token: None,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    backbone: &'a str,
    shape: [usize; 4],
    tensor_f32le_b64: String,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    logits: Vec<f32>,
}

/// Preprocesses locally and sends the normalized tensor to a model server
/// hosting the configured backbone; the server answers with raw logits.
pub struct RemoteInferenceClassifier {
    profile: PreprocessProfile,
    config: RemoteInferenceConfig,
    agent: ureq::Agent,
}

impl RemoteInferenceClassifier {
    pub fn new(
        backbone: BackboneId,
        config: RemoteInferenceConfig,
    ) -> Result<Self, ClassifierError> {
        let profile = backbone.profile();
        profile.validate()?;
        let endpoint = url::Url::parse(&config.endpoint)
            .map_err(|e| ClassifierError::Misconfigured(format!("invalid endpoint url: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ClassifierError::Misconfigured(
                "endpoint scheme must be http or https".to_string(),
            ));
        }
        if config.timeout_ms == 0 {
            return Err(ClassifierError::Misconfigured(
                "timeout must be > 0".to_string(),
            ));
        }
        let timeout = Duration::from_millis(u64::from(config.timeout_ms).max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Ok(Self {
            profile,
            config,
            agent,
        })
    }

    pub fn profile(&self) -> &PreprocessProfile {
        &self.profile
    }

    fn request_logits(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
        let body = InferenceRequest {
            backbone: self.profile.backbone.as_str(),
            shape: tensor.shape(),
            tensor_f32le_b64: BASE64.encode(tensor.to_le_bytes()),
        };
        let mut req = self
            .agent
            .post(&self.config.endpoint)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json");
        if let Some(token) = self.config.bearer_token.as_deref() {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }
        let response = match req.send_json(&body) {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => return Err(ClassifierError::HttpStatus(code)),
            Err(ureq::Error::Transport(transport)) => {
                let kind = classify_transport_error_kind(&format!(
                    "{:?} {}",
                    transport.kind(),
                    transport
                ));
                return Err(ClassifierError::Transport { kind });
            }
        };
        let parsed: InferenceResponse = serde_json::from_reader(response.into_reader())
            .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;
        Ok(parsed.logits)
    }
}

impl Classifier for RemoteInferenceClassifier {
    fn backbone(&self) -> BackboneId {
        self.profile.backbone
    }

    /// Runs one zero tensor through the server and checks the head shape.
    fn warm_up(&self) -> Result<(), ClassifierError> {
        let logits = self.request_logits(&ImageTensor::zeros(&self.profile))?;
        decide(&logits)?;
        info!(
            "classifier warm-up ok backbone={} endpoint={}",
            self.profile.backbone.as_str(),
            self.config.endpoint
        );
        Ok(())
    }

    fn predict(&self, image_path: &Path) -> Result<ClassificationOutcome, ClassifierError> {
        let tensor = preprocess_path(image_path, &self.profile)?;
        let logits = self.request_logits(&tensor).map_err(|e| {
            warn!("inference request failed: {e}");
            e
        })?;
        let outcome = decide(&logits)?;
        debug!(
            "classified {} as {} ({:.4})",
            image_path.display(),
            outcome.prediction,
            outcome.confidence.value()
        );
        Ok(outcome)
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}
