#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::{ContractViolation, Validate};

pub const USERNAME_MAX_CHARS: usize = 64;
pub const PASSWORD_MAX_CHARS: usize = 256;
pub const SALTED_SHA256_PREFIX: &str = "sha256$";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn new(name: impl Into<String>) -> Result<Self, ContractViolation> {
        let u = Self(name.into());
        u.validate()?;
        Ok(u)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for Username {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("username", &self.0, USERNAME_MAX_CHARS)
    }
}

impl TryFrom<String> for Username {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cleartext password as entered by the user. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(raw: impl Into<String>) -> Result<Self, ContractViolation> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "password",
                reason: "must not be empty",
            });
        }
        if raw.chars().count() > PASSWORD_MAX_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "password",
                reason: "exceeds maximum length",
            });
        }
        Ok(Self(raw))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// The value persisted for an account.
///
/// New accounts are always written as `SaltedSha256`. Values without the
/// `sha256$` prefix are treated as legacy cleartext entries.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StoredCredential {
    SaltedSha256 { salt_b64: String, digest_hex: String },
    Legacy(String),
}

impl StoredCredential {
    pub fn salted_sha256(
        salt_b64: impl Into<String>,
        digest_hex: impl Into<String>,
    ) -> Result<Self, ContractViolation> {
        let c = Self::SaltedSha256 {
            salt_b64: salt_b64.into(),
            digest_hex: digest_hex.into(),
        };
        c.validate()?;
        Ok(c)
    }

    pub fn parse(raw: &str) -> Result<Self, ContractViolation> {
        let Some(rest) = raw.strip_prefix(SALTED_SHA256_PREFIX) else {
            return Ok(Self::Legacy(raw.to_string()));
        };
        let Some((salt_b64, digest_hex)) = rest.split_once('$') else {
            return Err(ContractViolation::InvalidValue {
                field: "stored_credential",
                reason: "salted credential must be sha256$<salt>$<digest>",
            });
        };
        Self::salted_sha256(salt_b64, digest_hex)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::SaltedSha256 {
                salt_b64,
                digest_hex,
            } => format!("{SALTED_SHA256_PREFIX}{salt_b64}${digest_hex}"),
            Self::Legacy(raw) => raw.clone(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

impl Validate for StoredCredential {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            Self::SaltedSha256 {
                salt_b64,
                digest_hex,
            } => {
                if salt_b64.is_empty() || salt_b64.contains('$') {
                    return Err(ContractViolation::InvalidValue {
                        field: "stored_credential.salt_b64",
                        reason: "must be non-empty and must not contain '$'",
                    });
                }
                if digest_hex.len() != 64 || !digest_hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(ContractViolation::InvalidValue {
                        field: "stored_credential.digest_hex",
                        reason: "must be 64 hex chars",
                    });
                }
                Ok(())
            }
            Self::Legacy(raw) => {
                if raw.is_empty() {
                    return Err(ContractViolation::InvalidValue {
                        field: "stored_credential.legacy",
                        reason: "must not be empty",
                    });
                }
                Ok(())
            }
        }
    }
}

impl TryFrom<String> for StoredCredential {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let c = Self::parse(&value)?;
        c.validate()?;
        Ok(c)
    }
}

impl From<StoredCredential> for String {
    fn from(value: StoredCredential) -> Self {
        value.encode()
    }
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SaltedSha256 { .. } => f.write_str("StoredCredential::SaltedSha256(<redacted>)"),
            Self::Legacy(_) => f.write_str("StoredCredential::Legacy(<redacted>)"),
        }
    }
}
