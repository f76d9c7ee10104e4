//! RSA key material for the tool: generation, PEM loading and JWKS export.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};

use crate::constants::RSA_KEY_BITS;
use crate::error::LtiError;

/// A freshly generated keypair in the formats operators need to provision
/// a deployment.
pub struct GeneratedKeys {
    pub private_pem: String,
    pub public_pem: String,
    pub kid: String,
    pub jwks: Value,
}

/// Generate a new RSA keypair for signing tool tokens.
pub fn generate_keypair() -> Result<GeneratedKeys, LtiError> {
    let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
        .map_err(|e| LtiError::SigningFailure(format!("key generation failed: {e}")))?;
    let public = private.to_public_key();

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| LtiError::SigningFailure(e.to_string()))?
        .to_string();
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| LtiError::SigningFailure(e.to_string()))?;

    let kid = key_id(&public)?;
    let jwks = jwks_document(&public, &kid);

    Ok(GeneratedKeys {
        private_pem,
        public_pem,
        kid,
        jwks,
    })
}

/// Parse a private key in either PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1
/// (`BEGIN RSA PRIVATE KEY`) PEM encoding.
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, LtiError> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| LtiError::SigningFailure(format!("invalid RSA private key: {e}")))
}

/// Stable key identifier: first 16 hex chars of the BLAKE3 hash of the
/// DER-encoded public key.
pub fn key_id(public: &RsaPublicKey) -> Result<String, LtiError> {
    let der = public
        .to_public_key_der()
        .map_err(|e| LtiError::SigningFailure(e.to_string()))?;
    let hash = blake3::hash(der.as_bytes());
    Ok(hash.to_hex()[..16].to_string())
}

/// A single-key JWKS document for `public`.
pub fn jwks_document(public: &RsaPublicKey, kid: &str) -> Value {
    let n = URL_SAFE_NO_PAD.encode(public.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public.e().to_bytes_be());

    json!({
        "keys": [
            {
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "kid": kid,
                "n": n,
                "e": e
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;

    #[test]
    fn test_generated_keys_parse_back() {
        let keys = generate_keypair().unwrap();
        assert!(keys.private_pem.contains("BEGIN PRIVATE KEY"));
        assert!(keys.public_pem.contains("BEGIN PUBLIC KEY"));

        let private = parse_private_key(&keys.private_pem).unwrap();
        assert_eq!(key_id(&private.to_public_key()).unwrap(), keys.kid);

        let jwk = &keys.jwks["keys"][0];
        assert_eq!(jwk["kid"], keys.kid.as_str());
        assert_eq!(jwk["alg"], "RS256");
        assert_eq!(jwk["e"], "AQAB");
    }

    #[test]
    fn test_parse_pkcs1_pem() {
        let keys = generate_keypair().unwrap();
        let private = parse_private_key(&keys.private_pem).unwrap();
        let pkcs1 = private.to_pkcs1_pem(LineEnding::LF).unwrap();

        let reparsed = parse_private_key(&pkcs1).unwrap();
        assert_eq!(reparsed.to_public_key(), private.to_public_key());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(matches!(
            parse_private_key("not a key"),
            Err(LtiError::SigningFailure(_))
        ));
    }
}
