#![forbid(unsafe_code)]

pub mod http;

use std::collections::BTreeMap;
use std::env;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use deepcheck_kernel_contracts::history::{HistoryRecord, VerificationTimestamp};
use deepcheck_kernel_contracts::session::SessionPhase;
use deepcheck_os::views::{sidebar_lines, signed_in_caption, CONFIDENCE_DISCLAIMER};
use deepcheck_os::{
    ClassifierSettings, SessionContext, VerificationService, WorkflowConfig, WorkflowError,
};
use log::{debug, error, info, warn};
use rand::rngs::OsRng;
use rand::RngCore;

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
const SESSION_TOKEN_BYTES: usize = 24;
pub const SESSION_IDLE_TIMEOUT_SECS_DEFAULT: u64 = 30 * 60;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuthAdapterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionAdapterResponse {
    pub status: String,
    pub phase: String,
    pub session_token: Option<String>,
    pub current_user: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VerifyAdapterRequest {
    pub filename: String,
    pub image_b64: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VerifyAdapterResponse {
    pub status: String,
    pub prediction: String,
    pub confidence: f64,
    pub timestamp: String,
    pub prediction_line: String,
    pub confidence_line: String,
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntry {
    pub filename: String,
    pub prediction: String,
    pub confidence: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HistoryAdapterResponse {
    pub status: String,
    pub entries: Vec<HistoryEntry>,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClearHistoryAdapterResponse {
    pub status: String,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub backbone: Option<String>,
    pub account_count: Option<usize>,
    pub active_sessions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterErrorResponse {
    pub status: String,
    pub outcome: String,
    pub reason: String,
}

/// Failure surfaced to HTTP callers: status code plus a reason string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterFailure {
    pub http_status: u16,
    pub outcome: &'static str,
    pub reason: String,
}

impl AdapterFailure {
    fn unknown_session() -> Self {
        Self {
            http_status: 401,
            outcome: "UNKNOWN_SESSION",
            reason: "missing or unknown session token".to_string(),
        }
    }

    fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            http_status: 400,
            outcome: "INVALID_UPLOAD",
            reason: reason.into(),
        }
    }

    fn internal(reason: impl Into<String>) -> Self {
        Self {
            http_status: 500,
            outcome: "STORAGE_IO",
            reason: reason.into(),
        }
    }

    pub fn to_response(&self) -> AdapterErrorResponse {
        AdapterErrorResponse {
            status: "error".to_string(),
            outcome: self.outcome.to_string(),
            reason: self.reason.clone(),
        }
    }
}

impl From<WorkflowError> for AdapterFailure {
    fn from(err: WorkflowError) -> Self {
        let http_status = match &err {
            WorkflowError::InvalidInput(_) | WorkflowError::InvalidUpload(_) => 400,
            WorkflowError::AuthenticationFailure => 401,
            WorkflowError::DuplicateUsername(_)
            | WorkflowError::AlreadyAuthenticated
            | WorkflowError::NotReady { .. } => 409,
            WorkflowError::ClassifierFailure(_) => 502,
            WorkflowError::StorageIo(_)
            | WorkflowError::UploadIo { .. }
            | WorkflowError::LockPoisoned(_) => 500,
        };
        if http_status == 500 {
            error!("request failed: {err}");
        } else if http_status > 500 {
            warn!("request failed: {err}");
        }
        Self {
            http_status,
            outcome: err.kind(),
            reason: err.to_string(),
        }
    }
}

struct SessionEntry {
    ctx: SessionContext,
    last_seen: Instant,
}

impl SessionEntry {
    fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            last_seen: Instant::now(),
        }
    }
}

/// Shared HTTP-facing runtime. Sessions are keyed by an opaque random token;
/// each one is a `SessionContext` driven through the verification service.
/// A session unused for longer than the idle timeout is dropped.
pub struct AdapterRuntime {
    service: Arc<VerificationService>,
    sessions: Mutex<BTreeMap<String, SessionEntry>>,
    idle_timeout: Duration,
}

impl AdapterRuntime {
    pub fn new(service: Arc<VerificationService>) -> Self {
        Self::with_idle_timeout(
            service,
            Duration::from_secs(SESSION_IDLE_TIMEOUT_SECS_DEFAULT),
        )
    }

    pub fn with_idle_timeout(service: Arc<VerificationService>, idle_timeout: Duration) -> Self {
        Self {
            service,
            sessions: Mutex::new(BTreeMap::new()),
            idle_timeout,
        }
    }

    pub fn default_from_env() -> Result<Self, String> {
        let config = WorkflowConfig::from_env().map_err(|e| e.to_string())?;
        let classifier = ClassifierSettings::from_env()
            .and_then(|s| s.build_classifier())
            .map_err(|e| e.to_string())?;
        let idle_secs = match env::var("DEEPCHECK_SESSION_IDLE_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|v| (60..=7 * 24 * 3600).contains(v))
                .ok_or_else(|| {
                    format!("DEEPCHECK_SESSION_IDLE_SECS must be 60..=604800, got '{raw}'")
                })?,
            Err(_) => SESSION_IDLE_TIMEOUT_SECS_DEFAULT,
        };
        let service =
            VerificationService::open_data_dir(config, classifier).map_err(|e| e.to_string())?;
        Ok(Self::with_idle_timeout(
            Arc::new(service),
            Duration::from_secs(idle_secs),
        ))
    }

    pub fn service(&self) -> &VerificationService {
        &self.service
    }

    pub fn health_report(&self) -> Result<AdapterHealthResponse, String> {
        let account_count = self.service.account_count().map_err(|e| e.to_string())?;
        let active_sessions = self
            .lock_sessions()
            .map_err(|f| f.reason)?
            .len();
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            reason: None,
            backbone: Some(self.service.backbone().as_str().to_string()),
            account_count: Some(account_count),
            active_sessions: Some(active_sessions),
        })
    }

    pub fn sign_up(
        &self,
        request: AuthAdapterRequest,
    ) -> Result<SessionAdapterResponse, AdapterFailure> {
        let mut ctx = SessionContext::new();
        self.service
            .sign_up(&mut ctx, &request.username, &request.password)?;
        self.open_session(ctx)
    }

    pub fn log_in(
        &self,
        request: AuthAdapterRequest,
    ) -> Result<SessionAdapterResponse, AdapterFailure> {
        let mut ctx = SessionContext::new();
        self.service
            .log_in(&mut ctx, &request.username, &request.password)?;
        self.open_session(ctx)
    }

    pub fn log_out(&self, token: Option<&str>) -> Result<SessionAdapterResponse, AdapterFailure> {
        let token = token.ok_or_else(AdapterFailure::unknown_session)?;
        let mut ctx = self
            .lock_sessions()?
            .remove(token)
            .ok_or_else(AdapterFailure::unknown_session)?
            .ctx;
        self.service.log_out(&mut ctx)?;
        Ok(session_response(&ctx, None))
    }

    pub fn session_report(
        &self,
        token: Option<&str>,
    ) -> Result<SessionAdapterResponse, AdapterFailure> {
        let ctx = self.session(token)?;
        Ok(session_response(&ctx, None))
    }

    /// Runs the loading step for the session. Blocks for the configured
    /// delay; call from a blocking-capable thread.
    pub fn complete_loading(
        &self,
        token: Option<&str>,
    ) -> Result<SessionAdapterResponse, AdapterFailure> {
        let token = token.ok_or_else(AdapterFailure::unknown_session)?;
        let mut ctx = self.session(Some(token))?;
        let user = ctx.current_user().cloned();
        self.service.complete_loading(&mut ctx)?;

        let mut sessions = self.lock_sessions()?;
        match sessions.get_mut(token) {
            Some(current)
                if current.ctx.phase() == SessionPhase::Loading
                    && current.ctx.current_user().cloned() == user =>
            {
                *current = SessionEntry::new(ctx.clone());
                Ok(session_response(&ctx, None))
            }
            Some(current) => Ok(session_response(&current.ctx, None)),
            None => Err(AdapterFailure::unknown_session()),
        }
    }

    /// Decodes and classifies one upload. Blocks on the classifier.
    pub fn verify(
        &self,
        token: Option<&str>,
        request: VerifyAdapterRequest,
    ) -> Result<VerifyAdapterResponse, AdapterFailure> {
        let ctx = self.session(token)?;
        let image = BASE64
            .decode(request.image_b64.trim())
            .map_err(|e| AdapterFailure::bad_request(format!("image_b64 is not base64: {e}")))?;
        let result =
            self.service
                .verify(&ctx, &request.filename, &image, VerificationTimestamp::now_local())?;
        Ok(VerifyAdapterResponse {
            status: "ok".to_string(),
            prediction: result.record.prediction.as_str().to_string(),
            confidence: result.record.confidence.value(),
            timestamp: result.record.timestamp.as_str().to_string(),
            prediction_line: result.prediction_line,
            confidence_line: result.confidence_line,
            disclaimer: CONFIDENCE_DISCLAIMER.to_string(),
        })
    }

    pub fn recent_history(
        &self,
        token: Option<&str>,
    ) -> Result<HistoryAdapterResponse, AdapterFailure> {
        let ctx = self.session(token)?;
        let records = self.service.recent_history(&ctx)?;
        Ok(HistoryAdapterResponse {
            status: "ok".to_string(),
            lines: sidebar_lines(&records),
            entries: records.iter().map(history_entry).collect(),
        })
    }

    pub fn clear_history(
        &self,
        token: Option<&str>,
    ) -> Result<ClearHistoryAdapterResponse, AdapterFailure> {
        let ctx = self.session(token)?;
        let removed = self.service.clear_history(&ctx)?;
        Ok(ClearHistoryAdapterResponse {
            status: "ok".to_string(),
            removed,
        })
    }

    fn open_session(&self, ctx: SessionContext) -> Result<SessionAdapterResponse, AdapterFailure> {
        let token = new_session_token();
        let response = session_response(&ctx, Some(token.clone()));
        self.lock_sessions()?.insert(token, SessionEntry::new(ctx));
        debug!("session opened phase={}", response.phase);
        Ok(response)
    }

    fn session(&self, token: Option<&str>) -> Result<SessionContext, AdapterFailure> {
        let token = token.ok_or_else(AdapterFailure::unknown_session)?;
        let mut sessions = self.lock_sessions()?;
        let entry = sessions
            .get_mut(token)
            .ok_or_else(AdapterFailure::unknown_session)?;
        entry.last_seen = Instant::now();
        Ok(entry.ctx.clone())
    }

    /// Locks the registry after dropping sessions idle past the timeout.
    fn lock_sessions(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<String, SessionEntry>>, AdapterFailure> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| AdapterFailure::internal("adapter session registry lock poisoned"))?;
        let before = sessions.len();
        let idle_timeout = self.idle_timeout;
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            info!("expired {expired} idle session(s)");
        }
        Ok(sessions)
    }
}

fn session_response(ctx: &SessionContext, token: Option<String>) -> SessionAdapterResponse {
    let current_user = ctx.current_user().map(|u| u.as_str().to_string());
    SessionAdapterResponse {
        status: "ok".to_string(),
        phase: ctx.phase().as_str().to_string(),
        session_token: token,
        caption: current_user.as_deref().map(signed_in_caption),
        current_user,
    }
}

fn history_entry(record: &HistoryRecord) -> HistoryEntry {
    HistoryEntry {
        filename: record.filename.as_str().to_string(),
        prediction: record.prediction.as_str().to_string(),
        confidence: record.confidence.value(),
        timestamp: record.timestamp.as_str().to_string(),
    }
}

fn new_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn log_startup(bind: &str, runtime: &AdapterRuntime) {
    info!(
        "deepcheck_http listening on http://{bind} backbone={} data_dir={}",
        runtime.service.backbone().as_str(),
        runtime.service.config().data_dir().display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcheck_engines::{Classifier, ClassifierError};
    use deepcheck_kernel_contracts::classify::{BackboneId, ClassificationOutcome};
    use deepcheck_kernel_contracts::history::Prediction;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    struct StubClassifier;

    impl Classifier for StubClassifier {
        fn backbone(&self) -> BackboneId {
            BackboneId::EfficientNet224
        }

        fn predict(&self, image_path: &Path) -> Result<ClassificationOutcome, ClassifierError> {
            let bytes = fs::read(image_path).map_err(|e| ClassifierError::ImageDecode {
                path: image_path.display().to_string(),
                reason: e.to_string(),
            })?;
            if bytes.starts_with(b"fake") {
                Ok(ClassificationOutcome::new(Prediction::Fake, 0.875)?)
            } else if bytes.starts_with(b"real") {
                Ok(ClassificationOutcome::new(Prediction::Real, 0.92)?)
            } else {
                Err(ClassifierError::ImageDecode {
                    path: image_path.display().to_string(),
                    reason: "unrecognized".to_string(),
                })
            }
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(1);
        std::env::temp_dir().join(format!("deepcheck-adapter-test-{name}-{suffix}"))
    }

    fn service(dir: &Path) -> Arc<VerificationService> {
        let mut cfg = WorkflowConfig::mvp_v1(dir);
        cfg.loading_delay = Duration::ZERO;
        Arc::new(VerificationService::open_data_dir(cfg, Arc::new(StubClassifier)).unwrap())
    }

    fn runtime(dir: &Path) -> AdapterRuntime {
        AdapterRuntime::new(service(dir))
    }

    fn auth(username: &str, password: &str) -> AuthAdapterRequest {
        AuthAdapterRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn upload(filename: &str, bytes: &[u8]) -> VerifyAdapterRequest {
        VerifyAdapterRequest {
            filename: filename.to_string(),
            image_b64: BASE64.encode(bytes),
        }
    }

    fn ready_token(rt: &AdapterRuntime, user: &str) -> String {
        let out = rt.sign_up(auth(user, "pw1")).unwrap();
        let token = out.session_token.unwrap();
        assert_eq!(rt.complete_loading(Some(&token)).unwrap().phase, "READY");
        token
    }

    #[test]
    fn at_adapter_01_signup_returns_loading_session() {
        let dir = temp_dir("signup");
        let rt = runtime(&dir);
        let out = rt.sign_up(auth("alice", "pw1")).unwrap();
        assert_eq!(out.phase, "LOADING");
        assert_eq!(out.current_user.as_deref(), Some("alice"));
        assert_eq!(out.caption.as_deref(), Some("Logged in as: alice"));
        let token = out.session_token.unwrap();
        assert_eq!(token.len(), SESSION_TOKEN_BYTES * 2);
        assert_eq!(rt.session_report(Some(&token)).unwrap().phase, "LOADING");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn at_adapter_02_error_statuses() {
        let dir = temp_dir("errors");
        let rt = runtime(&dir);
        rt.sign_up(auth("alice", "pw1")).unwrap();

        let dup = rt.sign_up(auth("alice", "pw2")).unwrap_err();
        assert_eq!(dup.http_status, 409);
        assert_eq!(dup.outcome, "DUPLICATE_USERNAME");

        let bad = rt.log_in(auth("alice", "nope")).unwrap_err();
        assert_eq!(bad.http_status, 401);
        assert_eq!(bad.to_response().status, "error");

        assert_eq!(rt.sign_up(auth("", "pw")).unwrap_err().http_status, 400);
        assert_eq!(rt.session_report(None).unwrap_err().http_status, 401);
        assert_eq!(
            rt.recent_history(Some("not-a-token")).unwrap_err().http_status,
            401
        );
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn at_adapter_03_verify_then_sidebar() {
        let dir = temp_dir("verify");
        let rt = runtime(&dir);
        let token = ready_token(&rt, "alice");

        let out = rt.verify(Some(&token), upload("cat.png", b"real-cat")).unwrap();
        assert_eq!(out.prediction, "Real");
        assert_eq!(out.prediction_line, "Prediction: Real");
        assert_eq!(out.confidence_line, "Confidence: 92.00%");
        rt.verify(Some(&token), upload("mask.jpg", b"fake-mask")).unwrap();

        let history = rt.recent_history(Some(&token)).unwrap();
        let files: Vec<&str> = history.entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(files, vec!["mask.jpg", "cat.png"]);
        assert!(history.lines[0].contains("mask.jpg → Fake (87.5%)"));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn at_adapter_04_verify_rejected_outside_ready_and_on_bad_payload() {
        let dir = temp_dir("verify-gate");
        let rt = runtime(&dir);
        let token = rt
            .sign_up(auth("alice", "pw1"))
            .unwrap()
            .session_token
            .unwrap();
        let early = rt.verify(Some(&token), upload("cat.png", b"real")).unwrap_err();
        assert_eq!(early.http_status, 409);
        assert_eq!(early.outcome, "NOT_READY");

        rt.complete_loading(Some(&token)).unwrap();
        let bad_b64 = rt
            .verify(
                Some(&token),
                VerifyAdapterRequest {
                    filename: "cat.png".to_string(),
                    image_b64: "%%%".to_string(),
                },
            )
            .unwrap_err();
        assert_eq!(bad_b64.http_status, 400);

        let failing = rt.verify(Some(&token), upload("odd.png", b"????")).unwrap_err();
        assert_eq!(failing.http_status, 502);
        assert!(rt.recent_history(Some(&token)).unwrap().entries.is_empty());
        assert_eq!(
            rt.recent_history(Some(&token)).unwrap().lines,
            vec!["No detections yet".to_string()]
        );
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn at_adapter_05_clear_and_logout() {
        let dir = temp_dir("clear");
        let rt = runtime(&dir);
        let alice = ready_token(&rt, "alice");
        let bob = ready_token(&rt, "bob");
        rt.verify(Some(&alice), upload("a.png", b"real")).unwrap();
        rt.verify(Some(&bob), upload("b.png", b"fake")).unwrap();

        assert_eq!(rt.clear_history(Some(&alice)).unwrap().removed, 1);
        assert_eq!(rt.recent_history(Some(&bob)).unwrap().entries.len(), 1);

        let out = rt.log_out(Some(&alice)).unwrap();
        assert_eq!(out.phase, "LOGGED_OUT");
        assert!(out.current_user.is_none());
        assert_eq!(rt.session_report(Some(&alice)).unwrap_err().http_status, 401);
        assert_eq!(rt.health_report().unwrap().active_sessions, Some(1));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn at_adapter_06_health_reports_backbone() {
        let dir = temp_dir("health");
        let rt = runtime(&dir);
        rt.sign_up(auth("alice", "pw1")).unwrap();
        let health = rt.health_report().unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.backbone.as_deref(), Some("efficientnet-224"));
        assert_eq!(health.account_count, Some(1));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn at_adapter_07_idle_sessions_expire() {
        let dir = temp_dir("idle");
        let rt = AdapterRuntime::with_idle_timeout(service(&dir), Duration::from_millis(200));
        let stale = rt
            .sign_up(auth("alice", "pw1"))
            .unwrap()
            .session_token
            .unwrap();
        let fresh = rt
            .sign_up(auth("bob", "pw1"))
            .unwrap()
            .session_token
            .unwrap();
        for _ in 0..5 {
            std::thread::sleep(Duration::from_millis(60));
            rt.session_report(Some(&fresh)).unwrap();
        }
        assert_eq!(rt.session_report(Some(&stale)).unwrap_err().http_status, 401);
        assert_eq!(rt.health_report().unwrap().active_sessions, Some(1));
        assert_eq!(rt.session_report(Some(&fresh)).unwrap().phase, "LOADING");
        fs::remove_dir_all(dir).unwrap();
    }
}
