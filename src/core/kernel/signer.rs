use crate::core::config::{ExchangeConfig, KeyType};
use crate::core::errors::ExchangeError;
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signer as Ed25519SignerTrait, SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair, RsaKeyPair, RSA_PKCS1_SHA256};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Position of the 32-byte seed in a PKCS#8 v1 or v2 Ed25519 document that
/// `ring` has accepted.
const ED25519_PKCS8_SEED: std::ops::Range<usize> = 16..48;

/// Signs the canonical payload of a request.
///
/// Implementations hold read-only key material and are safe to share across
/// concurrently in-flight requests.
pub trait Signer: Send + Sync {
    /// Sign `payload` and return the encoded signature
    fn sign(&self, payload: &[u8]) -> Result<String, ExchangeError>;

    fn key_type(&self) -> KeyType;
}

/// HMAC-SHA256 over a shared secret, hex encoded
pub struct HmacSigner {
    secret: Zeroizing<Vec<u8>>,
}

impl HmacSigner {
    pub fn new(secret_key: &str) -> Self {
        Self {
            secret: Zeroizing::new(secret_key.as_bytes().to_vec()),
        }
    }
}

impl Signer for HmacSigner {
    fn sign(&self, payload: &[u8]) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ExchangeError::SigningError(format!("Invalid secret key: {}", e)))?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn key_type(&self) -> KeyType {
        KeyType::Hmac
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

/// RSA PKCS#1 v1.5 with SHA-256, base64 encoded.
///
/// The padding and hash are what the exchange verifies against; PKCS#1 v1.5
/// is deterministic, so the same key and payload always give the same output.
pub struct RsaSigner {
    key_pair: RsaKeyPair,
    rng: SystemRandom,
}

impl RsaSigner {
    /// Load from PEM: PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`)
    pub fn from_pem(private_key_pem: &str) -> Result<Self, ExchangeError> {
        let pem = pem::parse(private_key_pem.trim())
            .map_err(|e| ExchangeError::SigningError(format!("Failed to parse PEM: {}", e)))?;

        let key_pair = match pem.tag() {
            "PRIVATE KEY" => RsaKeyPair::from_pkcs8(pem.contents()),
            "RSA PRIVATE KEY" => RsaKeyPair::from_der(pem.contents()),
            other => {
                return Err(ExchangeError::SigningError(format!(
                    "PEM block '{}' is not an RSA private key",
                    other
                )));
            }
        }
        .map_err(|e| ExchangeError::SigningError(format!("Rejected RSA private key: {}", e)))?;

        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// DER-encoded `RSAPublicKey` matching this private key
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public().as_ref().to_vec()
    }
}

impl Signer for RsaSigner {
    fn sign(&self, payload: &[u8]) -> Result<String, ExchangeError> {
        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PKCS1_SHA256, &self.rng, payload, &mut signature)
            .map_err(|_| ExchangeError::SigningError("Failed to generate RSA signature".into()))?;
        Ok(general_purpose::STANDARD.encode(signature))
    }

    fn key_type(&self) -> KeyType {
        KeyType::Rsa
    }
}

impl fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSigner")
            .field("modulus_len", &self.key_pair.public().modulus_len())
            .finish_non_exhaustive()
    }
}

/// Ed25519 over a 32-byte seed, base64 encoded
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: &[u8]) -> Result<Self, ExchangeError> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| {
            ExchangeError::SigningError(format!(
                "Ed25519 private key must be 32 bytes, got {}",
                seed.len()
            ))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Accepts a PKCS#8 PEM block or a base64-encoded 32-byte seed
    pub fn from_key_material(private_key: &str) -> Result<Self, ExchangeError> {
        let trimmed = private_key.trim();
        if trimmed.starts_with("-----BEGIN") {
            let pem = pem::parse(trimmed)
                .map_err(|e| ExchangeError::SigningError(format!("Failed to parse PEM: {}", e)))?;
            if pem.tag() != "PRIVATE KEY" {
                return Err(ExchangeError::SigningError(format!(
                    "expected a PRIVATE KEY PEM block, got {}",
                    pem.tag()
                )));
            }
            return Self::from_pkcs8(pem.contents());
        }

        let seed = Zeroizing::new(general_purpose::STANDARD.decode(trimmed).map_err(|e| {
            ExchangeError::SigningError(format!("Invalid private key format: {}", e))
        })?);
        Self::from_seed(&seed)
    }

    /// Unencrypted PKCS#8 v1 or v2 DER. A v2 public key must match the seed.
    pub fn from_pkcs8(der: &[u8]) -> Result<Self, ExchangeError> {
        let key_pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(der).map_err(|e| {
            ExchangeError::SigningError(format!("not a PKCS#8 Ed25519 private key: {}", e))
        })?;
        let seed = der.get(ED25519_PKCS8_SEED).ok_or_else(|| {
            ExchangeError::SigningError("PKCS#8 Ed25519 document is truncated".to_string())
        })?;
        let signer = Self::from_seed(seed)?;
        if signer.verifying_key().as_bytes().as_slice() != key_pair.public_key().as_ref() {
            return Err(ExchangeError::SigningError(
                "PKCS#8 public key does not match the private key".to_string(),
            ));
        }
        Ok(signer)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, payload: &[u8]) -> Result<String, ExchangeError> {
        let signature = Ed25519SignerTrait::sign(&self.signing_key, payload);
        Ok(general_purpose::STANDARD.encode(signature.to_bytes()))
    }

    fn key_type(&self) -> KeyType {
        KeyType::Ed25519
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("verifying_key", &hex::encode(self.verifying_key().to_bytes()))
            .finish()
    }
}

/// The closed set of signing algorithms the exchange verifies.
#[derive(Debug)]
pub enum SignatureStrategy {
    Hmac(HmacSigner),
    Rsa(RsaSigner),
    Ed25519(Ed25519Signer),
}

impl SignatureStrategy {
    pub fn from_key_material(key_type: KeyType, secret: &str) -> Result<Self, ExchangeError> {
        match key_type {
            KeyType::Hmac => {
                if secret.is_empty() {
                    return Err(ExchangeError::SigningError(
                        "HMAC secret cannot be empty".to_string(),
                    ));
                }
                Ok(Self::Hmac(HmacSigner::new(secret)))
            }
            KeyType::Rsa => RsaSigner::from_pem(secret).map(Self::Rsa),
            KeyType::Ed25519 => Ed25519Signer::from_key_material(secret).map(Self::Ed25519),
        }
    }
}

impl Signer for SignatureStrategy {
    fn sign(&self, payload: &[u8]) -> Result<String, ExchangeError> {
        match self {
            Self::Hmac(signer) => signer.sign(payload),
            Self::Rsa(signer) => signer.sign(payload),
            Self::Ed25519(signer) => signer.sign(payload),
        }
    }

    fn key_type(&self) -> KeyType {
        match self {
            Self::Hmac(signer) => signer.key_type(),
            Self::Rsa(signer) => signer.key_type(),
            Self::Ed25519(signer) => signer.key_type(),
        }
    }
}

/// API key plus the strategy that signs on its behalf.
///
/// Immutable after construction; the API key never appears in `Debug` output.
pub struct Credential {
    api_key: Secret<String>,
    strategy: SignatureStrategy,
}

impl Credential {
    pub fn new(api_key: impl Into<String>, strategy: SignatureStrategy) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            strategy,
        }
    }

    pub fn hmac(api_key: impl Into<String>, secret_key: &str) -> Self {
        Self::new(api_key, SignatureStrategy::Hmac(HmacSigner::new(secret_key)))
    }

    /// Build from configuration; `None` for read-only configs
    pub fn from_config(config: &ExchangeConfig) -> Result<Option<Self>, ExchangeError> {
        if !config.has_credentials() {
            return Ok(None);
        }
        let strategy = SignatureStrategy::from_key_material(config.key_type, config.secret_key())?;
        Ok(Some(Self::new(config.api_key(), strategy)))
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn strategy(&self) -> &SignatureStrategy {
        &self.strategy
    }

    pub fn sign(&self, payload: &[u8]) -> Result<String, ExchangeError> {
        self.strategy.sign(payload)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"[REDACTED]")
            .field("key_type", &self.strategy.key_type())
            .finish()
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn get_timestamp() -> Result<u64, ExchangeError> {
    u64::try_from(chrono::Utc::now().timestamp_millis())
        .map_err(|e| ExchangeError::SigningError(format!("System clock before epoch: {}", e)))
}
