//! # JSON Web Encryption (JWE) Decryption
//!
//! This crate decrypts JWE tokens ([RFC7516]) in the flattened (and
//! compact) serialization. It validates and merges the JOSE header
//! sources, resolves the content encryption key under any of the
//! registered JWA ([RFC7518]) key management algorithms, performs
//! authenticated content decryption, and inflates compressed payloads.
//!
//! Decryption failures are deliberately opaque: key unwrap errors, tag
//! mismatches, and cipher failures are indistinguishable to the caller,
//! and a failed key unwrap substitutes a random key rather than failing
//! early, closing the adaptive chosen-ciphertext channel described in
//! RFC 7516, Section 11.5.
//!
//! [RFC7516]: https://www.rfc-editor.org/rfc/rfc7516
//! [RFC7518]: https://www.rfc-editor.org/rfc/rfc7518

mod error;
pub mod jwe;
mod jwk;

pub use error::Error;
pub use jwe::{
    DecryptOptions, Decrypted, DecryptionKey, EncAlgorithm, InflateFn, Jwe, JoseHeader,
    KeyAlgorithm, KeyResolver, Zip, decrypt,
};
pub use jwk::{Curve, KeyType, PublicKeyJwk};
