//! Caller-facing request types
//!
//! Malformed input is the only hard rejection in the system: everything past
//! [`ClassificationRequest::validate`] degrades instead of failing.

use crate::industry::CodeType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted length of any single request field, in bytes
pub const MAX_FIELD_LEN: usize = 100_000;

/// Request rejected at the boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// `business_name` missing or blank
    #[error("business_name is required")]
    MissingBusinessName,

    /// A field exceeds [`MAX_FIELD_LEN`]
    #[error("{field} too long: {len} bytes (max: {max})")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Actual length
        len: usize,
        /// Allowed length
        max: usize,
    },
}

/// Classify a business into standardized industry codes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassificationRequest {
    /// Business name (required)
    pub business_name: String,

    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,

    /// Website URL; content extraction is delegated to a collaborator
    #[serde(default)]
    pub website_url: Option<String>,
}

impl ClassificationRequest {
    /// Create a request with only a business name
    pub fn new(business_name: impl Into<String>) -> Self {
        Self {
            business_name: business_name.into(),
            description: None,
            website_url: None,
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a website URL
    pub fn with_website(mut self, url: impl Into<String>) -> Self {
        self.website_url = Some(url.into());
        self
    }

    /// Reject malformed input
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.business_name.trim().is_empty() {
            return Err(RequestError::MissingBusinessName);
        }
        check_len("business_name", Some(&self.business_name))?;
        check_len("description", self.description.as_deref())?;
        check_len("website_url", self.website_url.as_deref())?;
        Ok(())
    }

    /// Website URL if present and non-blank
    pub fn website(&self) -> Option<&str> {
        self.website_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Screen a business for prohibited, illegal or high-risk activity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiskRequest {
    /// Business name (required)
    pub business_name: String,

    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,

    /// Website URL
    #[serde(default)]
    pub website_url: Option<String>,

    /// Codes already assigned to the business, checked against restriction lists
    #[serde(default)]
    pub industry_codes: Vec<(CodeType, String)>,
}

impl RiskRequest {
    /// Create a request with only a business name
    pub fn new(business_name: impl Into<String>) -> Self {
        Self {
            business_name: business_name.into(),
            description: None,
            website_url: None,
            industry_codes: Vec::new(),
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a website URL
    pub fn with_website(mut self, url: impl Into<String>) -> Self {
        self.website_url = Some(url.into());
        self
    }

    /// Attach an industry code
    pub fn with_code(mut self, code_type: CodeType, code: impl Into<String>) -> Self {
        self.industry_codes.push((code_type, code.into()));
        self
    }

    /// Reject malformed input
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.business_name.trim().is_empty() {
            return Err(RequestError::MissingBusinessName);
        }
        check_len("business_name", Some(&self.business_name))?;
        check_len("description", self.description.as_deref())?;
        check_len("website_url", self.website_url.as_deref())?;
        Ok(())
    }
}

impl From<&ClassificationRequest> for RiskRequest {
    fn from(request: &ClassificationRequest) -> Self {
        Self {
            business_name: request.business_name.clone(),
            description: request.description.clone(),
            website_url: request.website_url.clone(),
            industry_codes: Vec::new(),
        }
    }
}

fn check_len(field: &'static str, value: Option<&str>) -> Result<(), RequestError> {
    match value {
        Some(v) if v.len() > MAX_FIELD_LEN => Err(RequestError::FieldTooLong {
            field,
            len: v.len(),
            max: MAX_FIELD_LEN,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_business_name() {
        let request = ClassificationRequest::new("   ");
        assert_eq!(request.validate(), Err(RequestError::MissingBusinessName));

        let request = RiskRequest::new("");
        assert_eq!(request.validate(), Err(RequestError::MissingBusinessName));
    }

    #[test]
    fn test_valid_request() {
        let request = ClassificationRequest::new("Joe's Coffee Shop")
            .with_description("neighborhood cafe");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_field_too_long() {
        let request = ClassificationRequest::new("Acme")
            .with_description("a".repeat(MAX_FIELD_LEN + 1));
        assert!(matches!(
            request.validate(),
            Err(RequestError::FieldTooLong { field: "description", .. })
        ));
    }

    #[test]
    fn test_blank_website_ignored() {
        let request = ClassificationRequest::new("Acme").with_website("  ");
        assert_eq!(request.website(), None);
        let request = ClassificationRequest::new("Acme").with_website("https://acme.test");
        assert_eq!(request.website(), Some("https://acme.test"));
    }
}
