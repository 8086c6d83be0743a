// Authentication module

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::ConfigError;

/// Query parameter carrying the verification token
pub const TOKEN_PARAM: &str = "t";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
    pub nbf: Option<u64>,
    pub iss: Option<String>,
    #[serde(flatten)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// Decides whether a request token is acceptable
pub trait AuthVerifier: Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

pub fn extract_query_token(
    query_params: &HashMap<String, String>,
    param_name: &str,
) -> Option<String> {
    query_params
        .get(param_name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// JWT verifier for HS256 shared secrets or RS256 public keys.
///
/// `exp` and `nbf` are enforced when present but not required.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    fn with_algorithm(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_nbf = true;
        validation.required_spec_claims.clear();
        Self { key, validation }
    }

    pub fn from_secret(secret: &str) -> Self {
        Self::with_algorithm(DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
    }

    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self::with_algorithm(
            DecodingKey::from_rsa_pem(pem)?,
            Algorithm::RS256,
        ))
    }

    /// Build the verifier described by `config`, if any
    pub fn from_config(config: &AuthConfig) -> Result<Option<Self>, ConfigError> {
        if let Some(path) = &config.jwt_public_key_path {
            let pem = std::fs::read(path).map_err(|e| {
                ConfigError::Invalid(format!("failed to read '{}': {}", path.display(), e))
            })?;
            let verifier = Self::from_rsa_pem(&pem).map_err(|e| {
                ConfigError::Invalid(format!("invalid RSA key '{}': {}", path.display(), e))
            })?;
            return Ok(Some(verifier));
        }

        Ok(config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(Self::from_secret))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(token_data.claims)
    }
}

impl AuthVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> bool {
        match self.validate(token) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Token rejected");
                false
            }
        }
    }
}
