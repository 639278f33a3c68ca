//! Key Store: the service's RSA signing key pair and its key identifier
//!
//! A [`KeyStore`] is built once at startup, either from PEM files or
//! synthetically, and shared by reference with the token issuer and the key
//! publisher. It is immutable for the life of the process.

use std::fmt;
use std::path::{Path, PathBuf};

use jsonwebtoken::EncodingKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;

use crate::error::KeyStoreError;

/// Smallest modulus this crate will generate or load
pub const MIN_RSA_BITS: usize = 2048;

/// Signing key pair plus the `kid` tokens are stamped with
pub struct KeyStore {
    key_id: String,
    encoding_key: EncodingKey,
    public_key: RsaPublicKey,
}

impl KeyStore {
    /// Build a key store from PEM text
    ///
    /// The private key may be PKCS#8 or PKCS#1. When `public_pem` is given it
    /// must be the public half of the private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key id is empty, either PEM fails to parse,
    /// the modulus is smaller than [`MIN_RSA_BITS`] or the halves do not match.
    pub fn from_pem(
        key_id: impl Into<String>,
        private_pem: &str,
        public_pem: Option<&str>,
    ) -> Result<Self, KeyStoreError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
            .map_err(|e| KeyStoreError::InvalidPrivateKey(e.to_string()))?;

        if let Some(public_pem) = public_pem {
            let public_key = RsaPublicKey::from_public_key_pem(public_pem)
                .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
                .map_err(|e| KeyStoreError::InvalidPublicKey(e.to_string()))?;
            if public_key != private_key.to_public_key() {
                return Err(KeyStoreError::KeyMismatch);
            }
        }

        Self::from_private_key(key_id, &private_key)
    }

    /// Load a key store from PEM files on disk
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Io`] if a file cannot be read, otherwise the
    /// same errors as [`KeyStore::from_pem`].
    pub fn from_pem_files(
        key_id: impl Into<String>,
        private_key_path: &Path,
        public_key_path: Option<&Path>,
    ) -> Result<Self, KeyStoreError> {
        let private_pem = read_key_file(private_key_path)?;
        let public_pem = public_key_path.map(read_key_file).transpose()?;
        let store = Self::from_pem(key_id, &private_pem, public_pem.as_deref())?;
        info!(
            kid = %store.key_id,
            path = %private_key_path.display(),
            bits = store.modulus_bits(),
            "Loaded signing key"
        );
        Ok(store)
    }

    /// Generate a fresh key pair in memory
    ///
    /// # Errors
    ///
    /// Returns an error if `bits` is below [`MIN_RSA_BITS`] or generation fails.
    pub fn generate(key_id: impl Into<String>, bits: usize) -> Result<Self, KeyStoreError> {
        let private_key = generate_private_key(bits)?;
        Self::from_private_key(key_id, &private_key)
    }

    fn from_private_key(
        key_id: impl Into<String>,
        private_key: &RsaPrivateKey,
    ) -> Result<Self, KeyStoreError> {
        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(KeyStoreError::EmptyKeyId);
        }
        let public_key = private_key.to_public_key();
        if public_key.size() * 8 < MIN_RSA_BITS {
            return Err(KeyStoreError::InvalidPrivateKey(format!(
                "RSA modulus must be at least {MIN_RSA_BITS} bits"
            )));
        }

        let der = private_key
            .to_pkcs1_der()
            .map_err(|e| KeyStoreError::InvalidPrivateKey(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

        Ok(Self {
            key_id,
            encoding_key,
            public_key,
        })
    }

    /// Key identifier stamped into every issued token
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Public verification key
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Modulus size in bits
    pub fn modulus_bits(&self) -> usize {
        self.public_key.size() * 8
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("key_id", &self.key_id)
            .field("bits", &self.modulus_bits())
            .field("encoding_key", &"<redacted>")
            .finish()
    }
}

/// PEM-encoded key pair produced by [`generate_pem_pair`]
pub struct PemKeyPair {
    /// PKCS#8 private key
    pub private_pem: String,
    /// SPKI public key
    pub public_pem: String,
}

impl fmt::Debug for PemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PemKeyPair")
            .field("private_pem", &"<redacted>")
            .field("public_pem", &self.public_pem)
            .finish()
    }
}

/// Generate a key pair and encode it as PEM, for provisioning key files
///
/// # Errors
///
/// Returns an error if `bits` is below [`MIN_RSA_BITS`], generation fails or
/// encoding fails.
pub fn generate_pem_pair(bits: usize) -> Result<PemKeyPair, KeyStoreError> {
    let private_key = generate_private_key(bits)?;
    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyStoreError::Generation(e.to_string()))?;
    let public_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyStoreError::Generation(e.to_string()))?;

    Ok(PemKeyPair {
        private_pem: private_pem.as_str().to_owned(),
        public_pem,
    })
}

fn generate_private_key(bits: usize) -> Result<RsaPrivateKey, KeyStoreError> {
    if bits < MIN_RSA_BITS {
        return Err(KeyStoreError::Generation(format!(
            "RSA keys must be at least {MIN_RSA_BITS} bits, got {bits}"
        )));
    }
    let mut rng = rand::thread_rng();
    RsaPrivateKey::new(&mut rng, bits).map_err(|e| KeyStoreError::Generation(e.to_string()))
}

fn read_key_file(path: &Path) -> Result<String, KeyStoreError> {
    std::fs::read_to_string(path).map_err(|source| KeyStoreError::Io {
        path: PathBuf::from(path),
        source,
    })
}
