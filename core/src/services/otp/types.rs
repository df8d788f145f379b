//! Request and result types for the OTP service

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::{OtpPurpose, RequestContext};
use crate::errors::{ErrorKind, OtpError};

/// Request to issue and deliver a code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOtpRequest {
    pub phone_number: String,
    pub purpose: OtpPurpose,
    pub user_id: Option<String>,
    /// Template id or inline template content; the purpose default when absent
    pub template: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub context: RequestContext,
}

impl SendOtpRequest {
    pub fn new(phone_number: impl Into<String>, purpose: OtpPurpose) -> Self {
        Self {
            phone_number: phone_number.into(),
            purpose,
            user_id: None,
            template: None,
            variables: HashMap::new(),
            context: RequestContext::default(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

/// Result of sending a code; never contains the code itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOtpResponse {
    /// Handle for later verify, cancel and status calls
    pub request_id: Uuid,
    pub expires_at: DateTime<Utc>,
    /// Earliest time another code may be requested
    pub resend_after: DateTime<Utc>,
    pub attempts_left: u32,
    /// Carrier that accepted the SMS
    pub provider: String,
    /// Carrier message id
    pub message_id: String,
}

/// How a verify request identifies its record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpTarget {
    RequestId(Uuid),
    Phone {
        phone_number: String,
        purpose: OtpPurpose,
    },
}

/// Request to verify a submitted code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOtpRequest {
    pub target: OtpTarget,
    pub code: String,
}

impl VerifyOtpRequest {
    pub fn by_request_id(request_id: Uuid, code: impl Into<String>) -> Self {
        Self {
            target: OtpTarget::RequestId(request_id),
            code: code.into(),
        }
    }

    pub fn by_phone(
        phone_number: impl Into<String>,
        purpose: OtpPurpose,
        code: impl Into<String>,
    ) -> Self {
        Self {
            target: OtpTarget::Phone {
                phone_number: phone_number.into(),
                purpose,
            },
            code: code.into(),
        }
    }
}

/// Outcome of a verify that reached the code comparison
///
/// A wrong code with attempts left is reported here with `valid == false`
/// rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOtpResult {
    pub valid: bool,
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub remaining_attempts: u32,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

impl VerifyOtpResult {
    pub(crate) fn verified(request_id: Uuid, user_id: Option<String>, remaining_attempts: u32) -> Self {
        Self {
            valid: true,
            request_id,
            user_id,
            remaining_attempts,
            error_kind: None,
            error_message: None,
        }
    }

    pub(crate) fn invalid(request_id: Uuid, user_id: Option<String>, remaining_attempts: u32) -> Self {
        let error = OtpError::OtpInvalid { remaining_attempts };
        Self {
            valid: false,
            request_id,
            user_id,
            remaining_attempts,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
        }
    }

    /// The soft failure as an error, for callers that prefer `Result`
    pub fn as_error(&self) -> Option<OtpError> {
        if self.valid {
            None
        } else {
            Some(OtpError::OtpInvalid {
                remaining_attempts: self.remaining_attempts,
            })
        }
    }
}
