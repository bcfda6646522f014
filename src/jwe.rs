//! # JSON Web Encryption (JWE)
//!
//! JWE ([RFC7516]) specifies how encrypted content can be represented using
//! JSON. See JWA ([RFC7518]) for more on the cryptographic algorithms and
//! identifiers used.
//!
//! This module implements decryption of the flattened JSON serialization
//! (single recipient), including the compact form, across the full set of
//! registered key management and content encryption algorithms.
//!
//! See also:
//!
//! - <https://www.iana.org/assignments/jose/jose.xhtml#web-signature-encryption-algorithms>
//!
//! [RFC7516]: https://www.rfc-editor.org/rfc/rfc7516
//! [RFC7518]: https://www.rfc-editor.org/rfc/rfc7518

mod cek;
mod content;
mod decrypt;
mod key;
mod key_mgmt;
mod zip;

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use self::decrypt::{DecryptOptions, Decrypted};
pub use self::key::{DecryptionKey, KeyResolver};
pub use self::zip::InflateFn;
use crate::error::Error;

/// The JOSE header: a mapping of header parameter name to value.
pub type JoseHeader = Map<String, Value>;

/// Decrypt the JWE and return the plaintext.
///
/// `key` is either a literal [`DecryptionKey`] or a [`KeyResolver`]
/// implementation that selects one from the (unverified) headers.
///
/// # Errors
///
/// Returns an error if the JWE cannot be decrypted. Key unwrap failures,
/// tag mismatches, and cipher failures are reported uniformly as
/// [`Error::DecryptionFailed`] with no further detail.
pub async fn decrypt(
    jwe: &Jwe, key: &impl KeyResolver, options: &DecryptOptions,
) -> Result<Decrypted, Error> {
    decrypt::decrypt(jwe, key, options).await
}

/// A JWE in the flattened JSON serialization (RFC 7516, Section 7.2.2).
///
/// At least one of the JWE Protected Header, JWE Shared Unprotected Header,
/// and JWE Per-Recipient Unprotected Header MUST be present. The members of
/// the JOSE Header are the union of the members of the three, whose
/// parameter names must be disjoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwe {
    /// JWE protected header, as base64url encoded JSON text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected: Option<String>,

    /// Shared unprotected header as a JSON object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unprotected: Option<JoseHeader>,

    /// Per-recipient unprotected header as a JSON object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<JoseHeader>,

    /// The encrypted content encryption key, as a base64url encoded string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<String>,

    /// Additional authenticated data, as a base64url encoded string. Not
    /// used for JWE Compact Serialization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aad: Option<String>,

    /// Initialization vector (nonce), as a base64url encoded string.
    pub iv: String,

    /// Ciphertext, as a base64url encoded string.
    pub ciphertext: String,

    /// Authentication tag resulting from the encryption, as a base64url
    /// encoded string.
    pub tag: String,
}

/// Deserialize a JWE from Compact Serialization format.
impl FromStr for Jwe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 5 {
            return Err(Error::InvalidJwe("invalid compact JWE".into()));
        }

        let part = |p: &str| if p.is_empty() { None } else { Some(p.to_string()) };

        Ok(Self {
            protected: part(parts[0]),
            encrypted_key: part(parts[1]),
            iv: parts[2].to_string(),
            ciphertext: parts[3].to_string(),
            tag: parts[4].to_string(),
            ..Self::default()
        })
    }
}

/// The algorithm used to encrypt (key encryption) or derive (key agreement)
/// the value of the content encryption key (CEK).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// Direct use of a shared symmetric key as the CEK.
    #[serde(rename = "dir")]
    Dir,

    /// RSAES-PKCS1-v1_5.
    #[serde(rename = "RSA1_5")]
    Rsa1_5,

    /// RSAES OAEP using default parameters (SHA-1).
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,

    /// RSAES OAEP using SHA-256 and MGF1 with SHA-256.
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,

    /// RSAES OAEP using SHA-384 and MGF1 with SHA-384.
    #[serde(rename = "RSA-OAEP-384")]
    RsaOaep384,

    /// RSAES OAEP using SHA-512 and MGF1 with SHA-512.
    #[serde(rename = "RSA-OAEP-512")]
    RsaOaep512,

    /// AES Key Wrap using a 128-bit key.
    #[serde(rename = "A128KW")]
    A128Kw,

    /// AES Key Wrap using a 192-bit key.
    #[serde(rename = "A192KW")]
    A192Kw,

    /// AES Key Wrap using a 256-bit key.
    #[serde(rename = "A256KW")]
    A256Kw,

    /// Key wrapping with AES GCM using a 128-bit key.
    #[serde(rename = "A128GCMKW")]
    A128GcmKw,

    /// Key wrapping with AES GCM using a 192-bit key.
    #[serde(rename = "A192GCMKW")]
    A192GcmKw,

    /// Key wrapping with AES GCM using a 256-bit key.
    #[serde(rename = "A256GCMKW")]
    A256GcmKw,

    /// Elliptic Curve Diffie-Hellman Ephemeral-Static key agreement using
    /// Concat KDF.
    ///
    /// Uses Direct Key Agreement: the agreed key is the CEK.
    #[serde(rename = "ECDH-ES")]
    EcdhEs,

    /// ECDH-ES using Concat KDF and CEK wrapped with "A128KW".
    #[serde(rename = "ECDH-ES+A128KW")]
    EcdhEsA128Kw,

    /// ECDH-ES using Concat KDF and CEK wrapped with "A192KW".
    #[serde(rename = "ECDH-ES+A192KW")]
    EcdhEsA192Kw,

    /// ECDH-ES using Concat KDF and CEK wrapped with "A256KW".
    #[serde(rename = "ECDH-ES+A256KW")]
    EcdhEsA256Kw,

    /// PBES2 with HMAC SHA-256 and "A128KW" wrapping.
    #[serde(rename = "PBES2-HS256+A128KW")]
    Pbes2Hs256A128Kw,

    /// PBES2 with HMAC SHA-384 and "A192KW" wrapping.
    #[serde(rename = "PBES2-HS384+A192KW")]
    Pbes2Hs384A192Kw,

    /// PBES2 with HMAC SHA-512 and "A256KW" wrapping.
    #[serde(rename = "PBES2-HS512+A256KW")]
    Pbes2Hs512A256Kw,
}

impl KeyAlgorithm {
    /// The registered `alg` header parameter value.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::Rsa1_5 => "RSA1_5",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::RsaOaep384 => "RSA-OAEP-384",
            Self::RsaOaep512 => "RSA-OAEP-512",
            Self::A128Kw => "A128KW",
            Self::A192Kw => "A192KW",
            Self::A256Kw => "A256KW",
            Self::A128GcmKw => "A128GCMKW",
            Self::A192GcmKw => "A192GCMKW",
            Self::A256GcmKw => "A256GCMKW",
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsA128Kw => "ECDH-ES+A128KW",
            Self::EcdhEsA192Kw => "ECDH-ES+A192KW",
            Self::EcdhEsA256Kw => "ECDH-ES+A256KW",
            Self::Pbes2Hs256A128Kw => "PBES2-HS256+A128KW",
            Self::Pbes2Hs384A192Kw => "PBES2-HS384+A192KW",
            Self::Pbes2Hs512A256Kw => "PBES2-HS512+A256KW",
        }
    }

    /// Resolve a registered `alg` header parameter value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for values outside the supported
    /// catalogue.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "dir" => Ok(Self::Dir),
            "RSA1_5" => Ok(Self::Rsa1_5),
            "RSA-OAEP" => Ok(Self::RsaOaep),
            "RSA-OAEP-256" => Ok(Self::RsaOaep256),
            "RSA-OAEP-384" => Ok(Self::RsaOaep384),
            "RSA-OAEP-512" => Ok(Self::RsaOaep512),
            "A128KW" => Ok(Self::A128Kw),
            "A192KW" => Ok(Self::A192Kw),
            "A256KW" => Ok(Self::A256Kw),
            "A128GCMKW" => Ok(Self::A128GcmKw),
            "A192GCMKW" => Ok(Self::A192GcmKw),
            "A256GCMKW" => Ok(Self::A256GcmKw),
            "ECDH-ES" => Ok(Self::EcdhEs),
            "ECDH-ES+A128KW" => Ok(Self::EcdhEsA128Kw),
            "ECDH-ES+A192KW" => Ok(Self::EcdhEsA192Kw),
            "ECDH-ES+A256KW" => Ok(Self::EcdhEsA256Kw),
            "PBES2-HS256+A128KW" => Ok(Self::Pbes2Hs256A128Kw),
            "PBES2-HS384+A192KW" => Ok(Self::Pbes2Hs384A192Kw),
            "PBES2-HS512+A256KW" => Ok(Self::Pbes2Hs512A256Kw),
            _ => Err(Error::NotSupported(format!(
                "unsupported \"alg\" header parameter value: {name}"
            ))),
        }
    }
}

impl Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The algorithm used to perform authenticated encryption on the plaintext
/// to produce the ciphertext and the Authentication Tag. MUST be an AEAD
/// algorithm.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum EncAlgorithm {
    /// AES CBC with HMAC SHA-256 composite authenticated encryption.
    #[serde(rename = "A128CBC-HS256")]
    A128CbcHs256,

    /// AES CBC with HMAC SHA-384 composite authenticated encryption.
    #[serde(rename = "A192CBC-HS384")]
    A192CbcHs384,

    /// AES CBC with HMAC SHA-512 composite authenticated encryption.
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,

    /// AES GCM using a 128-bit key.
    #[serde(rename = "A128GCM")]
    A128Gcm,

    /// AES GCM using a 192-bit key.
    #[serde(rename = "A192GCM")]
    A192Gcm,

    /// AES GCM using a 256-bit key.
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

impl EncAlgorithm {
    /// The registered `enc` header parameter value.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Resolve a registered `enc` header parameter value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for values outside the supported
    /// catalogue.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "A128CBC-HS256" => Ok(Self::A128CbcHs256),
            "A192CBC-HS384" => Ok(Self::A192CbcHs384),
            "A256CBC-HS512" => Ok(Self::A256CbcHs512),
            "A128GCM" => Ok(Self::A128Gcm),
            "A192GCM" => Ok(Self::A192Gcm),
            "A256GCM" => Ok(Self::A256Gcm),
            _ => Err(Error::NotSupported(format!(
                "unsupported \"enc\" header parameter value: {name}"
            ))),
        }
    }

    /// The required CEK length in bytes. CBC-HMAC variants count both the
    /// MAC-key half and the encryption-key half.
    #[must_use]
    pub const fn key_size(&self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A128CbcHs256 | Self::A256Gcm => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
        }
    }

    /// The required initialization vector length in bytes.
    #[must_use]
    pub const fn iv_size(&self) -> usize {
        match self {
            Self::A128CbcHs256 | Self::A192CbcHs384 | Self::A256CbcHs512 => 16,
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => 12,
        }
    }
}

impl Display for EncAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The compression algorithm applied to the plaintext before encryption.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Zip {
    /// DEFLATE compression algorithm.
    #[default]
    #[serde(rename = "DEF")]
    Deflate,
}
