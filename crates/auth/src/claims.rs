use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims decoded from an access token payload.
///
/// The client only reads these for display and expiry hints. Signature
/// verification is the backend's job and is intentionally not done here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id as issued by the backend).
    #[serde(default)]
    pub sub: Option<String>,

    /// Expiration, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,

    /// Issued-at, seconds since the epoch.
    #[serde(default)]
    pub iat: Option<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token is not a three-part JWT")]
    Malformed,

    #[error("token payload is not valid base64url: {0}")]
    Encoding(String),

    #[error("token payload is not valid JSON: {0}")]
    Json(String),
}

/// Decode the payload segment of a JWT without verifying it.
pub fn decode_claims(token: &str) -> Result<Claims, ClaimsError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ClaimsError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClaimsError::Encoding(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Json(e.to_string()))
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|s| Utc.timestamp_opt(s, 0).single())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(payload: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn decodes_payload_segment() {
        let token = token_with(r#"{"sub":"42","exp":1900000000,"iat":1800000000,"type":"access"}"#);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("42"));
        assert_eq!(claims.exp, Some(1_900_000_000));
    }

    #[test]
    fn rejects_opaque_tokens() {
        assert_eq!(decode_claims("opaque-token"), Err(ClaimsError::Malformed));
        assert!(matches!(decode_claims("a.!!!.c"), Err(ClaimsError::Encoding(_))));
        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("nope"));
        assert!(matches!(decode_claims(&not_json), Err(ClaimsError::Json(_))));
    }

    #[test]
    fn expiry_hint_is_read_from_exp() {
        let claims = decode_claims(&token_with(r#"{"exp":1900000000}"#)).unwrap();
        assert_eq!(claims.expires_at().map(|t| t.timestamp()), Some(1_900_000_000));
        assert_eq!(Claims::default().expires_at(), None);
    }
}
