//! # JWE Decryption
//!
//! The decryption pipeline: resolve and validate the JOSE header, resolve
//! the key, run key management, decrypt the content, and optionally inflate
//! the plaintext.

use std::collections::{HashMap, HashSet};

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::rngs::OsRng;
use serde_json::Value;

use super::zip::InflateFn;
use super::{
    EncAlgorithm, Jwe, JoseHeader, KeyAlgorithm, KeyResolver, Zip, content, key_mgmt, zip,
};
use crate::error::Error;

/// Options governing a single decryption call.
#[derive(Clone, Default)]
pub struct DecryptOptions {
    /// Key management algorithm values the caller accepts. `None` accepts
    /// any supported algorithm.
    pub key_management_algorithms: Option<Vec<KeyAlgorithm>>,

    /// Content encryption algorithm values the caller accepts. `None`
    /// accepts any supported algorithm.
    pub content_encryption_algorithms: Option<Vec<EncAlgorithm>>,

    /// Recognized critical extension header parameters. The value records
    /// whether the parameter must appear in the protected header.
    pub crit: Option<HashMap<String, bool>>,

    /// Override for the raw DEFLATE decompression step.
    pub inflate: Option<InflateFn>,
}

/// The outcome of a successful decryption. Each optional field is present
/// only when the corresponding token field was present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decrypted {
    /// The decrypted payload.
    pub plaintext: Vec<u8>,

    /// The JWE protected header.
    pub protected_header: Option<JoseHeader>,

    /// The JWE shared unprotected header.
    pub shared_header: Option<JoseHeader>,

    /// The JWE per-recipient unprotected header.
    pub recipient_header: Option<JoseHeader>,

    /// Decoded additional authenticated data.
    pub aad: Option<Vec<u8>>,
}

/// Decrypt the flattened JWE and return the plaintext together with the
/// header sources that produced it.
pub(super) async fn decrypt(
    jwe: &Jwe, key: &impl KeyResolver, options: &DecryptOptions,
) -> Result<Decrypted, Error> {
    if jwe.protected.is_none() && jwe.unprotected.is_none() && jwe.header.is_none() {
        return Err(Error::InvalidJwe("JOSE Header missing".into()));
    }

    let protected = jwe
        .protected
        .as_ref()
        .map(|p| {
            let bytes = Base64UrlUnpadded::decode_vec(p)
                .map_err(|e| Error::InvalidJwe(format!("issue decoding protected header: {e}")))?;
            serde_json::from_slice::<JoseHeader>(&bytes).map_err(|e| {
                Error::InvalidJwe(format!("issue deserializing protected header: {e}"))
            })
        })
        .transpose()?;

    let merged = merge_headers(
        protected.as_ref(),
        jwe.unprotected.as_ref(),
        jwe.header.as_ref(),
    )?;

    validate_crit(options.crit.as_ref(), protected.as_ref(), &merged)?;
    let zip = resolve_zip(protected.as_ref(), &merged)?;

    let Some(alg) = merged.get("alg").and_then(Value::as_str).filter(|a| !a.is_empty()) else {
        return Err(Error::InvalidJwe("missing JWE algorithm (alg) in JWE header".into()));
    };
    let alg = KeyAlgorithm::from_name(alg)?;

    let Some(enc) = merged.get("enc").and_then(Value::as_str).filter(|e| !e.is_empty()) else {
        return Err(Error::InvalidJwe(
            "missing JWE encryption algorithm (enc) in JWE header".into(),
        ));
    };
    let enc = EncAlgorithm::from_name(enc)?;

    if let Some(allowed) = &options.key_management_algorithms {
        if !allowed.contains(&alg) {
            return Err(Error::NotAllowed("alg"));
        }
    }
    if let Some(allowed) = &options.content_encryption_algorithms {
        if !allowed.contains(&enc) {
            return Err(Error::NotAllowed("enc"));
        }
    }

    let key = key.resolve_key(protected.as_ref(), jwe).await?;
    let cek = key_mgmt::deduce_cek(
        &alg,
        &enc,
        &key,
        jwe.encrypted_key.as_deref(),
        &merged,
        &mut OsRng,
    )?;

    let iv = Base64UrlUnpadded::decode_vec(&jwe.iv)
        .map_err(|e| Error::InvalidJwe(format!("issue decoding `iv`: {e}")))?;
    let tag = Base64UrlUnpadded::decode_vec(&jwe.tag)
        .map_err(|e| Error::InvalidJwe(format!("issue decoding `tag`: {e}")))?;
    let ciphertext = Base64UrlUnpadded::decode_vec(&jwe.ciphertext)
        .map_err(|e| Error::InvalidJwe(format!("issue decoding `ciphertext`: {e}")))?;

    // the additional data is the ASCII text of the wire fields, not their
    // decoded bytes
    let mut additional_data = jwe.protected.clone().unwrap_or_default().into_bytes();
    if let Some(aad) = &jwe.aad {
        additional_data.push(b'.');
        additional_data.extend_from_slice(aad.as_bytes());
    }

    let mut plaintext = content::decrypt(&enc, &cek, ciphertext, &iv, &tag, &additional_data)?;

    if zip == Some(Zip::Deflate) {
        plaintext = match options.inflate.as_deref() {
            Some(inflate) => inflate(&plaintext)?,
            None => zip::inflate(&plaintext)?,
        };
    }

    let aad = jwe
        .aad
        .as_ref()
        .map(|aad| {
            Base64UrlUnpadded::decode_vec(aad)
                .map_err(|e| Error::InvalidJwe(format!("issue decoding `aad`: {e}")))
        })
        .transpose()?;

    Ok(Decrypted {
        plaintext,
        protected_header: protected,
        shared_header: jwe.unprotected.clone(),
        recipient_header: jwe.header.clone(),
        aad,
    })
}

/// Merge the three header sources into the effective JOSE header. Parameter
/// names must be pairwise disjoint across sources.
fn merge_headers(
    protected: Option<&JoseHeader>, unprotected: Option<&JoseHeader>, header: Option<&JoseHeader>,
) -> Result<JoseHeader, Error> {
    let mut seen = HashSet::new();
    let mut merged = JoseHeader::new();

    for source in [protected, unprotected, header].into_iter().flatten() {
        for (name, value) in source {
            if !seen.insert(name.clone()) {
                return Err(Error::InvalidJwe(
                    "protected, unprotected, and per-recipient header parameter names must be disjoint".into(),
                ));
            }
            merged.insert(name.clone(), value.clone());
        }
    }

    Ok(merged)
}

/// Enforce the `crit` (Critical) header parameter rules: `crit` itself must
/// be integrity protected, every listed name must be recognized by the
/// caller and present in the merged header, and names flagged as protected
/// must appear in the protected header.
fn validate_crit(
    recognized: Option<&HashMap<String, bool>>, protected: Option<&JoseHeader>,
    merged: &JoseHeader,
) -> Result<(), Error> {
    let Some(crit) = merged.get("crit") else {
        return Ok(());
    };
    if protected.is_none_or(|p| !p.contains_key("crit")) {
        return Err(Error::InvalidJwe(
            "\"crit\" header parameter must be integrity protected".into(),
        ));
    }

    let names = crit
        .as_array()
        .filter(|names| !names.is_empty())
        .and_then(|names| {
            names
                .iter()
                .map(|name| name.as_str().filter(|n| !n.is_empty()))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| {
            Error::InvalidJwe(
                "\"crit\" header parameter must be an array of non-empty strings".into(),
            )
        })?;

    for name in names {
        let Some(&protection_required) = recognized.and_then(|r| r.get(name)) else {
            return Err(Error::NotSupported(format!(
                "extension header parameter \"{name}\" is not recognized"
            )));
        };
        if !merged.contains_key(name) {
            return Err(Error::InvalidJwe(format!(
                "extension header parameter \"{name}\" is missing"
            )));
        }
        if protection_required && protected.is_none_or(|p| !p.contains_key(name)) {
            return Err(Error::InvalidJwe(format!(
                "extension header parameter \"{name}\" must be integrity protected"
            )));
        }
    }

    Ok(())
}

/// The `zip` header parameter must be integrity protected, and only raw
/// DEFLATE is supported.
fn resolve_zip(protected: Option<&JoseHeader>, merged: &JoseHeader) -> Result<Option<Zip>, Error> {
    let Some(zip) = merged.get("zip") else {
        return Ok(None);
    };
    if protected.is_none_or(|p| !p.contains_key("zip")) {
        return Err(Error::InvalidJwe(
            "\"zip\" header parameter must be integrity protected".into(),
        ));
    }

    let zip = serde_json::from_value::<Zip>(zip.clone()).map_err(|_| {
        Error::NotSupported("unsupported \"zip\" header parameter value".into())
    })?;
    Ok(Some(zip))
}
