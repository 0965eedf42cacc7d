//! Required request header validation.
//!
//! The configured header (by default `X-Device-Id`) must be present with a
//! non-empty value. On success the value is handed to the rest of the chain
//! as the `device_id` context entry so later stages never re-parse headers.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};

use crate::security::guard::{
    ContextPatch, Guard, GuardDecision, GuardError, GuardKind, GuardRequest, ReasonCode,
    DEVICE_ID_KEY,
};

pub const DEFAULT_DEVICE_ID_HEADER: &str = "X-Device-Id";

#[derive(Debug, Clone)]
pub struct HeaderGuard {
    name: HeaderName,
}

impl HeaderGuard {
    pub fn new(name: &str) -> Result<Self, GuardError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(GuardError::EmptyHeaderName);
        }
        let name = HeaderName::from_bytes(trimmed.as_bytes())
            .map_err(|_| GuardError::InvalidHeaderName(name.to_string()))?;
        Ok(Self { name })
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.name
    }

    pub fn check_headers(&self, headers: &HeaderMap) -> GuardDecision {
        // Values that are not visible ASCII count as missing.
        let value = headers
            .get(&self.name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if value.is_empty() {
            tracing::debug!(header = %self.name, "Required header missing");
            return GuardDecision::reject(ReasonCode::HeaderMissing);
        }

        GuardDecision::Allow(ContextPatch::empty().with(DEVICE_ID_KEY, value))
    }
}

impl Default for HeaderGuard {
    fn default() -> Self {
        Self {
            name: HeaderName::from_static("x-device-id"),
        }
    }
}

#[async_trait]
impl Guard for HeaderGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Header
    }

    async fn check(&self, request: &GuardRequest) -> GuardDecision {
        self.check_headers(&request.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_missing_header_rejected() {
        let guard = HeaderGuard::default();
        let decision = guard.check_headers(&HeaderMap::new());
        assert_eq!(decision.reason(), Some(ReasonCode::HeaderMissing));
    }

    #[test]
    fn test_empty_header_rejected() {
        let guard = HeaderGuard::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-device-id", HeaderValue::from_static(""));
        assert_eq!(
            guard.check_headers(&headers).reason(),
            Some(ReasonCode::HeaderMissing)
        );
    }

    #[test]
    fn test_present_header_patches_device_id() {
        let guard = HeaderGuard::new(DEFAULT_DEVICE_ID_HEADER).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("X-Device-Id", HeaderValue::from_static("dev-123"));

        match guard.check_headers(&headers) {
            GuardDecision::Allow(patch) => assert_eq!(patch.get(DEVICE_ID_KEY), Some("dev-123")),
            other => panic!("expected allow, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_header_name() {
        let guard = HeaderGuard::new("X-Client-Token").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-device-id", HeaderValue::from_static("dev-1"));
        assert!(!guard.check_headers(&headers).is_allow());

        headers.insert("x-client-token", HeaderValue::from_static("abc"));
        assert!(guard.check_headers(&headers).is_allow());
    }

    #[test]
    fn test_non_ascii_value_treated_as_missing() {
        let guard = HeaderGuard::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-device-id", HeaderValue::from_bytes(&[0xE2, 0x82, 0xAC]).unwrap());
        assert!(!guard.check_headers(&headers).is_allow());
    }

    #[test]
    fn test_bad_names_fail_construction() {
        assert_eq!(HeaderGuard::new("  ").unwrap_err(), GuardError::EmptyHeaderName);
        assert_eq!(
            HeaderGuard::new("bad header").unwrap_err(),
            GuardError::InvalidHeaderName("bad header".to_string())
        );
    }
}
