//! [`Signer`]: keyed-MAC token signing, abstracted so the algorithm and
//! key live behind an interface rather than hardcoded at each call site.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::Claims;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("token signature or shape rejected: {0}")]
    Invalid(String),
}

pub trait Signer: std::fmt::Debug + Send + Sync {
    fn sign(&self, claims: &Claims) -> Result<String, SignerError>;
    fn verify(&self, token: &str) -> Result<Claims, SignerError>;
}

/// HMAC-SHA256 signer. Implementations MUST reject tokens whose algorithm
/// header doesn't match the configured one — `jsonwebtoken::Validation`
/// does this by construction since `decode` only accepts the algorithms
/// listed in `validation.algorithms`.
#[derive(Clone)]
pub struct HmacSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

impl HmacSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }
}

impl Signer for HmacSigner {
    fn sign(&self, claims: &Claims) -> Result<String, SignerError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| SignerError::Invalid(e.to_string()))
    }

    fn verify(&self, token: &str) -> Result<Claims, SignerError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // We check exp/nbf ourselves against the injected Clock so tests
        // can control time; jsonwebtoken's own clock would bypass that.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| SignerError::Invalid(e.to_string()))
    }
}
