//! # Decryption Keys
//!
//! The recipient's key material, and the trait used to resolve it. The
//! variant of [`DecryptionKey`] fixes both the kind of key and, for
//! asymmetric keys, the curve. Curve identification happens once, at
//! construction, and travels with the key handle.

use std::fmt;

use zeroize::Zeroizing;

use super::{Jwe, JoseHeader};
use crate::error::Error;

/// The recipient's key material for decrypting a JWE.
#[derive(Clone)]
pub enum DecryptionKey {
    /// Symmetric secret: the CEK itself for `dir`, the wrapping key for
    /// `A*KW` and `A*GCMKW`, or the password for `PBES2-*`.
    Symmetric(Zeroizing<Vec<u8>>),

    /// RSA private key for `RSA1_5` and `RSA-OAEP*`.
    Rsa(rsa::RsaPrivateKey),

    /// P-256 private key for `ECDH-ES*`.
    P256(p256::SecretKey),

    /// P-384 private key for `ECDH-ES*`.
    P384(p384::SecretKey),

    /// P-521 private key for `ECDH-ES*`.
    P521(p521::SecretKey),

    /// X25519 static secret for `ECDH-ES*`.
    X25519(x25519_dalek::StaticSecret),
}

impl DecryptionKey {
    /// Construct a symmetric key (or PBES2 password) from raw bytes.
    pub fn symmetric(secret: impl Into<Vec<u8>>) -> Self {
        Self::Symmetric(Zeroizing::new(secret.into()))
    }

    pub(super) const fn kind(&self) -> &'static str {
        match self {
            Self::Symmetric(_) => "symmetric",
            Self::Rsa(_) => "RSA",
            Self::P256(_) | Self::P384(_) | Self::P521(_) => "EC",
            Self::X25519(_) => "X25519",
        }
    }
}

/// Key material is never printed.
impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKey").field("kind", &self.kind()).finish_non_exhaustive()
    }
}

impl From<rsa::RsaPrivateKey> for DecryptionKey {
    fn from(key: rsa::RsaPrivateKey) -> Self {
        Self::Rsa(key)
    }
}

impl From<p256::SecretKey> for DecryptionKey {
    fn from(key: p256::SecretKey) -> Self {
        Self::P256(key)
    }
}

impl From<p384::SecretKey> for DecryptionKey {
    fn from(key: p384::SecretKey) -> Self {
        Self::P384(key)
    }
}

impl From<p521::SecretKey> for DecryptionKey {
    fn from(key: p521::SecretKey) -> Self {
        Self::P521(key)
    }
}

impl From<x25519_dalek::StaticSecret> for DecryptionKey {
    fn from(key: x25519_dalek::StaticSecret) -> Self {
        Self::X25519(key)
    }
}

/// Resolves the decryption key for a JWE.
///
/// A literal [`DecryptionKey`] resolves to itself. Implement this trait to
/// select a key dynamically, for example by the `kid` header parameter. No
/// token component has been cryptographically verified when `resolve_key`
/// is called.
pub trait KeyResolver: Send + Sync {
    /// Return the key to decrypt the JWE with.
    ///
    /// # Errors
    ///
    /// Returns an error if no suitable key can be resolved. The error is
    /// surfaced to the caller unchanged.
    fn resolve_key(
        &self, protected: Option<&JoseHeader>, jwe: &Jwe,
    ) -> impl Future<Output = Result<DecryptionKey, Error>> + Send;
}

impl KeyResolver for DecryptionKey {
    fn resolve_key(
        &self, _protected: Option<&JoseHeader>, _jwe: &Jwe,
    ) -> impl Future<Output = Result<DecryptionKey, Error>> + Send {
        async move { Ok(self.clone()) }
    }
}
