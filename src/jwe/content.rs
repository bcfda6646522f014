//! # Content Decryption
//!
//! Authenticated decryption of the JWE ciphertext under the two content
//! encryption families of RFC 7518 Section 5: AES-CBC with HMAC-SHA2, and
//! AES-GCM.
//!
//! CEK and IV lengths are checked up front; those are shape errors raised
//! before any secret-dependent work. Once key material is in use, every
//! failure (tag mismatch, padding, cipher) collapses into the one opaque
//! [`Error::DecryptionFailed`] kind.

use aes_gcm::aead::KeyInit;
use aes_gcm::{AeadInPlace, Aes128Gcm, Aes256Gcm, Key, Nonce, Tag};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use super::EncAlgorithm;
use crate::error::Error;

/// AES GCM using a 192-bit key and the 96-bit nonce shared by all GCM
/// variants.
pub(super) type Aes192Gcm = aes_gcm::AesGcm<aes::Aes192, aes_gcm::aead::consts::U12>;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Decrypt the ciphertext using the CEK, IV, AAD, and authentication tag.
pub(super) fn decrypt(
    enc: &EncAlgorithm, cek: &[u8], ciphertext: Vec<u8>, iv: &[u8], tag: &[u8], aad: &[u8],
) -> Result<Vec<u8>, Error> {
    if cek.len() != enc.key_size() {
        return Err(Error::InvalidJwe("invalid content encryption key length".to_string()));
    }
    if iv.len() != enc.iv_size() {
        return Err(Error::InvalidJwe("invalid initialization vector length".to_string()));
    }

    match enc {
        EncAlgorithm::A128CbcHs256 | EncAlgorithm::A192CbcHs384 | EncAlgorithm::A256CbcHs512 => {
            cbc_decrypt(enc, cek, &ciphertext, iv, tag, aad)
        }
        EncAlgorithm::A128Gcm | EncAlgorithm::A192Gcm | EncAlgorithm::A256Gcm => {
            gcm_decrypt(enc, cek, ciphertext, iv, tag, aad)
        }
    }
}

/// AES-CBC-HMAC composition (RFC 7518 Section 5.2): the first half of the
/// CEK keys the MAC, the second half keys the cipher. The tag is verified
/// in constant time before the block cipher runs.
fn cbc_decrypt(
    enc: &EncAlgorithm, cek: &[u8], ciphertext: &[u8], iv: &[u8], tag: &[u8], aad: &[u8],
) -> Result<Vec<u8>, Error> {
    let (mac_key, enc_key) = cek.split_at(cek.len() / 2);

    let mut mac_data = Vec::with_capacity(aad.len() + iv.len() + ciphertext.len() + 8);
    mac_data.extend_from_slice(aad);
    mac_data.extend_from_slice(iv);
    mac_data.extend_from_slice(ciphertext);
    mac_data.extend_from_slice(&(aad.len() as u64 * 8).to_be_bytes());

    let computed = match enc {
        EncAlgorithm::A128CbcHs256 => compute_tag::<Hmac<Sha256>>(mac_key, &mac_data)?,
        EncAlgorithm::A192CbcHs384 => compute_tag::<Hmac<Sha384>>(mac_key, &mac_data)?,
        _ => compute_tag::<Hmac<Sha512>>(mac_key, &mac_data)?,
    };

    // the tag is the MAC truncated to the length of the MAC key
    if !bool::from(computed[..mac_key.len()].ct_eq(tag)) {
        return Err(Error::DecryptionFailed);
    }

    let plaintext = match enc {
        EncAlgorithm::A128CbcHs256 => Aes128CbcDec::new_from_slices(enc_key, iv)
            .map_err(|_| Error::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        EncAlgorithm::A192CbcHs384 => Aes192CbcDec::new_from_slices(enc_key, iv)
            .map_err(|_| Error::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        _ => Aes256CbcDec::new_from_slices(enc_key, iv)
            .map_err(|_| Error::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
    };

    plaintext.map_err(|_| Error::DecryptionFailed)
}

fn compute_tag<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| Error::DecryptionFailed)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// AES-GCM (RFC 7518 Section 5.3): a single authenticated decrypt call.
fn gcm_decrypt(
    enc: &EncAlgorithm, cek: &[u8], mut buffer: Vec<u8>, iv: &[u8], tag: &[u8], aad: &[u8],
) -> Result<Vec<u8>, Error> {
    if tag.len() != 16 {
        return Err(Error::DecryptionFailed);
    }

    let nonce = Nonce::from_slice(iv);
    let tag = Tag::from_slice(tag);

    match enc {
        EncAlgorithm::A128Gcm => Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(cek))
            .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
        EncAlgorithm::A192Gcm => Aes192Gcm::new(Key::<Aes192Gcm>::from_slice(cek))
            .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
        _ => Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(cek))
            .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
    }
    .map_err(|_| Error::DecryptionFailed)?;

    Ok(buffer)
}
