//! Bearer session tokens.
//!
//! The account service issues tokens; this module verifies them. A token
//! is `base64url(user_id.expiry)` + "." + `base64url(hmac_sha256(secret,
//! claims))`. Verification is constant-time on the MAC so token probing
//! leaks nothing through timing.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::protocol::UserId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

/// Verifier (and, for tests and local tooling, issuer) of session
/// tokens.
#[derive(Clone)]
pub struct SessionTokens {
    secret: std::sync::Arc<[u8]>,
}

impl SessionTokens {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: std::sync::Arc::from(secret.as_bytes().to_vec().into_boxed_slice()),
        }
    }

    /// Issue a token for `user_id` valid for `ttl_secs` seconds.
    pub fn issue(&self, user_id: UserId, ttl_secs: i64) -> String {
        let expiry = Utc::now().timestamp() + ttl_secs;
        let claims = format!("{user_id}.{expiry}");
        let signature = self.sign(claims.as_bytes());
        format!(
            "{}.{}",
            BASE64_URL.encode(claims.as_bytes()),
            BASE64_URL.encode(signature)
        )
    }

    /// Verify a token and return the authenticated user id.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let (claims_b64, signature_b64) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let claims = BASE64_URL
            .decode(claims_b64)
            .map_err(|_| AuthError::Malformed)?;
        let provided = BASE64_URL
            .decode(signature_b64)
            .map_err(|_| AuthError::Malformed)?;

        let expected = self.sign(&claims);
        if expected.ct_eq(&provided).unwrap_u8() != 1 {
            return Err(AuthError::InvalidSignature);
        }

        let claims = String::from_utf8(claims).map_err(|_| AuthError::Malformed)?;
        let (user_id, expiry) = claims.split_once('.').ok_or(AuthError::Malformed)?;
        let user_id: UserId = user_id.parse().map_err(|_| AuthError::Malformed)?;
        let expiry: i64 = expiry.parse().map_err(|_| AuthError::Malformed)?;

        if Utc::now().timestamp() > expiry {
            return Err(AuthError::Expired);
        }
        Ok(user_id)
    }

    fn sign(&self, claims: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(claims);
        mac.finalize().into_bytes().to_vec()
    }
}
