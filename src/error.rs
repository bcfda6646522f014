//! # Errors
//!
//! Failures are grouped into a small set of categories that callers can
//! branch on. Everything that happens after key material is in play is
//! deliberately collapsed into the single opaque [`Error::DecryptionFailed`]
//! kind so that a caller (or an attacker driving a caller) cannot learn why
//! a token failed to decrypt. See RFC 7516, Section 11.5.

use thiserror::Error;

/// Errors returned when processing a JWE.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The token is structurally invalid: a mandatory field is missing,
    /// header sources are not disjoint, a critical extension is violated,
    /// or a field cannot be decoded.
    #[error("invalid JWE: {0}")]
    InvalidJwe(String),

    /// A recognized but unsupported algorithm, curve, or compression value.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The resolved algorithm is excluded by a caller-supplied allow-list.
    /// Kept distinct from [`Error::InvalidJwe`] so policy rejections can be
    /// audited independently of parsing failures.
    #[error("\"{0}\" header parameter value not allowed")]
    NotAllowed(&'static str),

    /// The supplied key is of the wrong kind for the algorithm in use. This
    /// is a caller error and is never masked by the random-CEK fallback.
    #[error("invalid key input: {0}")]
    InvalidKeyInput(String),

    /// Decryption failed. Key unwrap errors, tag verification failures, and
    /// cipher failures are indistinguishable here on purpose.
    #[error("decryption operation failed")]
    DecryptionFailed,
}
