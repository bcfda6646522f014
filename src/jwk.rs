//! # JSON Web Key (JWK)
//!
//! A JWK ([RFC7517]) is a JSON representation of a cryptographic key. Here
//! only the public-key subset needed to carry the `epk` (ephemeral public
//! key) header parameter for ECDH-ES key agreement is modelled.
//!
//! [RFC7517]: https://www.rfc-editor.org/rfc/rfc7517

use serde::{Deserialize, Serialize};

/// Simplified JSON Web Key (JWK) key structure, as carried in the `epk`
/// header parameter.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct PublicKeyJwk {
    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Key type.
    pub kty: KeyType,

    /// Cryptographic curve type.
    pub crv: Curve,

    /// X coordinate.
    pub x: String,

    /// Y coordinate. Not used for X25519 keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// Cryptographic key type.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub enum KeyType {
    /// Octet key pair (Edwards/Montgomery curve)
    #[default]
    #[serde(rename = "OKP")]
    Okp,

    /// Elliptic curve key pair
    #[serde(rename = "EC")]
    Ec,

    /// Octet string
    #[serde(rename = "oct")]
    Oct,
}

/// Cryptographic curve type.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub enum Curve {
    /// X25519 function (encryption) key pairs.
    #[default]
    X25519,

    /// secp256r1 curve.
    #[serde(rename = "P-256")]
    P256,

    /// secp384r1 curve.
    #[serde(rename = "P-384")]
    P384,

    /// secp521r1 curve.
    #[serde(rename = "P-521")]
    P521,
}
