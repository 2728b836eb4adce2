#![forbid(unsafe_code)]

use std::fmt;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::account::Username;
use crate::common::{validate_text, validate_unit_interval};
use crate::{ContractViolation, Validate};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const UPLOAD_FILENAME_MAX_CHARS: usize = 255;
pub const ACCEPTED_UPLOAD_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prediction {
    Real,
    Fake,
}

impl Prediction {
    pub fn as_str(self) -> &'static str {
        match self {
            Prediction::Real => "Real",
            Prediction::Fake => "Fake",
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(v: f64) -> Result<Self, ContractViolation> {
        validate_unit_interval("confidence", v)?;
        Ok(Self(v))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn percent(self) -> f64 {
        self.0 * 100.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ContractViolation;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

/// Wall-clock time of a verification, `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerificationTimestamp(String);

impl VerificationTimestamp {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ContractViolation> {
        let t = Self(raw.into());
        t.validate()?;
        Ok(t)
    }

    pub fn from_naive(dt: NaiveDateTime) -> Self {
        Self(dt.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn now_local() -> Self {
        Self::from_naive(Local::now().naive_local())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for VerificationTimestamp {
    fn validate(&self) -> Result<(), ContractViolation> {
        let parsed = NaiveDateTime::parse_from_str(&self.0, TIMESTAMP_FORMAT).map_err(|_| {
            ContractViolation::InvalidValue {
                field: "verification_timestamp",
                reason: "must match YYYY-MM-DD HH:MM:SS",
            }
        })?;
        // chrono accepts unpadded fields; the persisted form must be canonical.
        if parsed.format(TIMESTAMP_FORMAT).to_string() != self.0 {
            return Err(ContractViolation::InvalidValue {
                field: "verification_timestamp",
                reason: "must match YYYY-MM-DD HH:MM:SS",
            });
        }
        Ok(())
    }
}

impl TryFrom<String> for VerificationTimestamp {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<VerificationTimestamp> for String {
    fn from(value: VerificationTimestamp) -> Self {
        value.0
    }
}

impl fmt::Display for VerificationTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of an uploaded image as supplied by the client. A bare file name,
/// never a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UploadFilename(String);

impl UploadFilename {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let f = Self(name.into());
        f.validate()?;
        Ok(f)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn extension(&self) -> Option<String> {
        self.0
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

impl Validate for UploadFilename {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("upload_filename", &self.0, UPLOAD_FILENAME_MAX_CHARS)?;
        if self.0.contains('/') || self.0.contains('\\') {
            return Err(ContractViolation::InvalidValue {
                field: "upload_filename",
                reason: "must not contain path separators",
            });
        }
        if self.0 == "." || self.0 == ".." || self.0.starts_with("..") {
            return Err(ContractViolation::InvalidValue {
                field: "upload_filename",
                reason: "must not be a relative path component",
            });
        }
        match self.extension() {
            Some(ext) if ACCEPTED_UPLOAD_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            _ => Err(ContractViolation::InvalidValue {
                field: "upload_filename",
                reason: "extension must be one of jpg, jpeg, png",
            }),
        }
    }
}

impl TryFrom<String> for UploadFilename {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UploadFilename> for String {
    fn from(value: UploadFilename) -> Self {
        value.0
    }
}

/// One verification outcome as persisted in the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user: Username,
    pub filename: UploadFilename,
    pub prediction: Prediction,
    pub confidence: Confidence,
    pub timestamp: VerificationTimestamp,
}

impl HistoryRecord {
    pub fn v1(
        user: Username,
        filename: UploadFilename,
        prediction: Prediction,
        confidence: Confidence,
        timestamp: VerificationTimestamp,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            user,
            filename,
            prediction,
            confidence,
            timestamp,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn is_owned_by(&self, user: &Username) -> bool {
        &self.user == user
    }
}

impl Validate for HistoryRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.user.validate()?;
        self.filename.validate()?;
        validate_unit_interval("history_record.confidence", self.confidence.value())?;
        self.timestamp.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> HistoryRecord {
        HistoryRecord::v1(
            Username::new("alice").unwrap(),
            UploadFilename::new("cat.png").unwrap(),
            Prediction::Real,
            Confidence::new(0.92).unwrap(),
            VerificationTimestamp::parse("2024-05-01 09:30:00").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn at_history_contract_01_record_serializes_with_prototype_field_names() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["user"], "alice");
        assert_eq!(json["filename"], "cat.png");
        assert_eq!(json["prediction"], "Real");
        assert_eq!(json["confidence"], 0.92);
        assert_eq!(json["timestamp"], "2024-05-01 09:30:00");
    }

    #[test]
    fn at_history_contract_02_timestamp_must_be_canonical() {
        assert!(VerificationTimestamp::parse("2024-05-01 09:30:00").is_ok());
        assert!(VerificationTimestamp::parse("2024-5-1 9:30:00").is_err());
        assert!(VerificationTimestamp::parse("2024-05-01T09:30:00").is_err());
        assert!(VerificationTimestamp::parse("").is_err());
    }

    #[test]
    fn at_history_contract_03_confidence_out_of_range_is_rejected_on_load() {
        let raw = r#"{"user":"alice","filename":"cat.png","prediction":"Fake","confidence":1.5,"timestamp":"2024-05-01 09:30:00"}"#;
        assert!(serde_json::from_str::<HistoryRecord>(raw).is_err());
    }

    #[test]
    fn at_history_contract_04_upload_filename_rules() {
        assert!(UploadFilename::new("photo.JPG").is_ok());
        assert!(UploadFilename::new("photo.jpeg").is_ok());
        assert!(UploadFilename::new("photo.gif").is_err());
        assert!(UploadFilename::new("../etc/passwd.png").is_err());
        assert!(UploadFilename::new("dir\\x.png").is_err());
        assert!(UploadFilename::new("noext").is_err());
    }

    #[test]
    fn at_history_contract_05_confidence_percent() {
        let c = Confidence::new(0.9234).unwrap();
        assert!((c.percent() - 92.34).abs() < 1e-9);
    }
}
