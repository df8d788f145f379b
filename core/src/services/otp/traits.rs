//! Collaborators consumed by the OTP service

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::entities::OtpPurpose;
use crate::errors::DomainResult;

/// Produces the outbound SMS text for a code
#[async_trait]
pub trait MessageRenderer: Send + Sync {
    /// Render `code` for `purpose`
    ///
    /// `template` is either a template id known to the renderer or inline
    /// template content; `None` selects the purpose default.
    async fn render(
        &self,
        template: Option<&str>,
        purpose: OtpPurpose,
        code: &str,
        variables: &HashMap<String, String>,
    ) -> DomainResult<String>;
}
