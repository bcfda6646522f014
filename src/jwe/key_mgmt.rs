//! # Key Management
//!
//! Resolves the content encryption key from the `alg` header parameter and
//! the recipient's key: direct use, RSA and AES key unwrapping, AES-GCM key
//! unwrapping, ECDH-ES agreement with the Concat KDF, and PBES2 password
//! based derivation.
//!
//! To mitigate the attacks described in RFC 3218, the recipient MUST NOT
//! distinguish between format, padding, and length errors of encrypted
//! keys. When any of those occur a randomly generated CEK is substituted
//! and decryption proceeds to the (failing) tag check, per RFC 7516
//! Section 11.5. Only a key of the wrong kind escapes the mask.

use aes_gcm::aead::KeyInit;
use aes_gcm::{AeadInPlace, Aes128Gcm, Aes256Gcm, Key, Nonce, Tag};
use aes_kw::Kek;
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::Hmac;
use rand::{CryptoRng, RngCore};
use rsa::{Oaep, Pkcs1v15Encrypt};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use super::content::Aes192Gcm;
use super::key::DecryptionKey;
use super::{EncAlgorithm, JoseHeader, KeyAlgorithm, cek};
use crate::error::Error;
use crate::jwk::{Curve, PublicKeyJwk};

/// Prefix byte (tag) of an uncompressed SEC1 point.
const TAG_PUBKEY_FULL: u8 = 0x04;

/// Resolve the CEK for the declared key management algorithm.
pub(super) fn deduce_cek(
    alg: &KeyAlgorithm, enc: &EncAlgorithm, key: &DecryptionKey, encrypted_key: Option<&str>,
    header: &JoseHeader, rng: &mut (impl RngCore + CryptoRng),
) -> Result<Zeroizing<Vec<u8>>, Error> {
    check_key_kind(alg, key)?;

    match unwrap_cek(alg, enc, key, encrypted_key, header) {
        Ok(cek) => Ok(cek),
        Err(Error::InvalidKeyInput(e)) => Err(Error::InvalidKeyInput(e)),
        // substitute a random CEK and let the tag check fail downstream
        Err(_) => Ok(cek::generate(enc, rng)),
    }
}

/// A key of the wrong kind is a caller error, reported before any use of
/// the encrypted key so that it is never masked.
fn check_key_kind(alg: &KeyAlgorithm, key: &DecryptionKey) -> Result<(), Error> {
    let ok = match alg {
        KeyAlgorithm::Dir
        | KeyAlgorithm::A128Kw
        | KeyAlgorithm::A192Kw
        | KeyAlgorithm::A256Kw
        | KeyAlgorithm::A128GcmKw
        | KeyAlgorithm::A192GcmKw
        | KeyAlgorithm::A256GcmKw
        | KeyAlgorithm::Pbes2Hs256A128Kw
        | KeyAlgorithm::Pbes2Hs384A192Kw
        | KeyAlgorithm::Pbes2Hs512A256Kw => matches!(key, DecryptionKey::Symmetric(_)),
        KeyAlgorithm::Rsa1_5
        | KeyAlgorithm::RsaOaep
        | KeyAlgorithm::RsaOaep256
        | KeyAlgorithm::RsaOaep384
        | KeyAlgorithm::RsaOaep512 => matches!(key, DecryptionKey::Rsa(_)),
        KeyAlgorithm::EcdhEs
        | KeyAlgorithm::EcdhEsA128Kw
        | KeyAlgorithm::EcdhEsA192Kw
        | KeyAlgorithm::EcdhEsA256Kw => matches!(
            key,
            DecryptionKey::P256(_)
                | DecryptionKey::P384(_)
                | DecryptionKey::P521(_)
                | DecryptionKey::X25519(_)
        ),
    };

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidKeyInput(format!(
            "{} key cannot be used with the \"{}\" algorithm",
            key.kind(),
            alg.name()
        )))
    }
}

fn unwrap_cek(
    alg: &KeyAlgorithm, enc: &EncAlgorithm, key: &DecryptionKey, encrypted_key: Option<&str>,
    header: &JoseHeader,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    match alg {
        KeyAlgorithm::Dir => {
            if encrypted_key.is_some() {
                return Err(Error::InvalidJwe("encountered unexpected JWE encrypted key".into()));
            }
            Ok(Zeroizing::new(symmetric(key)?.to_vec()))
        }

        KeyAlgorithm::A128Kw | KeyAlgorithm::A192Kw | KeyAlgorithm::A256Kw => {
            let size = match alg {
                KeyAlgorithm::A128Kw => 16,
                KeyAlgorithm::A192Kw => 24,
                _ => 32,
            };
            aes_unwrap(symmetric(key)?, size, &required_key(encrypted_key)?)
        }

        KeyAlgorithm::A128GcmKw | KeyAlgorithm::A192GcmKw | KeyAlgorithm::A256GcmKw => {
            let size = match alg {
                KeyAlgorithm::A128GcmKw => 16,
                KeyAlgorithm::A192GcmKw => 24,
                _ => 32,
            };
            gcm_unwrap(symmetric(key)?, size, header, &required_key(encrypted_key)?)
        }

        KeyAlgorithm::Rsa1_5 => {
            rsa_unwrap(rsa_key(key)?, Pkcs1v15Encrypt, &required_key(encrypted_key)?)
        }
        KeyAlgorithm::RsaOaep => {
            rsa_unwrap(rsa_key(key)?, Oaep::new::<sha1::Sha1>(), &required_key(encrypted_key)?)
        }
        KeyAlgorithm::RsaOaep256 => {
            rsa_unwrap(rsa_key(key)?, Oaep::new::<Sha256>(), &required_key(encrypted_key)?)
        }
        KeyAlgorithm::RsaOaep384 => {
            rsa_unwrap(rsa_key(key)?, Oaep::new::<Sha384>(), &required_key(encrypted_key)?)
        }
        KeyAlgorithm::RsaOaep512 => {
            rsa_unwrap(rsa_key(key)?, Oaep::new::<Sha512>(), &required_key(encrypted_key)?)
        }

        KeyAlgorithm::EcdhEs => {
            if encrypted_key.is_some() {
                return Err(Error::InvalidJwe("encountered unexpected JWE encrypted key".into()));
            }
            let z = agree(key, header)?;
            let (apu, apv) = party_info(header)?;
            concat_kdf(&z, enc.name(), enc.key_size(), &apu, &apv)
        }

        KeyAlgorithm::EcdhEsA128Kw | KeyAlgorithm::EcdhEsA192Kw | KeyAlgorithm::EcdhEsA256Kw => {
            let size = match alg {
                KeyAlgorithm::EcdhEsA128Kw => 16,
                KeyAlgorithm::EcdhEsA192Kw => 24,
                _ => 32,
            };
            let z = agree(key, header)?;
            let (apu, apv) = party_info(header)?;
            let kek = concat_kdf(&z, alg.name(), size, &apu, &apv)?;
            aes_unwrap(&kek, size, &required_key(encrypted_key)?)
        }

        KeyAlgorithm::Pbes2Hs256A128Kw
        | KeyAlgorithm::Pbes2Hs384A192Kw
        | KeyAlgorithm::Pbes2Hs512A256Kw => {
            let size = match alg {
                KeyAlgorithm::Pbes2Hs256A128Kw => 16,
                KeyAlgorithm::Pbes2Hs384A192Kw => 24,
                _ => 32,
            };
            let kek = pbes2_derive(alg, symmetric(key)?, header, size)?;
            aes_unwrap(&kek, size, &required_key(encrypted_key)?)
        }
    }
}

fn symmetric(key: &DecryptionKey) -> Result<&[u8], Error> {
    let DecryptionKey::Symmetric(secret) = key else {
        return Err(Error::InvalidKeyInput("expected a symmetric key".into()));
    };
    Ok(secret)
}

fn rsa_key(key: &DecryptionKey) -> Result<&rsa::RsaPrivateKey, Error> {
    let DecryptionKey::Rsa(private_key) = key else {
        return Err(Error::InvalidKeyInput("expected an RSA private key".into()));
    };
    Ok(private_key)
}

/// The encrypted key is mandatory for every wrapping algorithm.
fn required_key(encrypted_key: Option<&str>) -> Result<Vec<u8>, Error> {
    let Some(encrypted_key) = encrypted_key else {
        return Err(Error::InvalidJwe("JWE encrypted key missing".into()));
    };
    Base64UrlUnpadded::decode_vec(encrypted_key)
        .map_err(|e| Error::InvalidJwe(format!("issue decoding `encrypted_key`: {e}")))
}

fn header_b64(header: &JoseHeader, name: &str) -> Result<Vec<u8>, Error> {
    let Some(value) = header.get(name).and_then(Value::as_str) else {
        return Err(Error::InvalidJwe(format!("JOSE header is missing the `{name}` parameter")));
    };
    Base64UrlUnpadded::decode_vec(value)
        .map_err(|e| Error::InvalidJwe(format!("issue decoding `{name}`: {e}")))
}

fn optional_b64(header: &JoseHeader, name: &str) -> Result<Vec<u8>, Error> {
    match header.get(name).and_then(Value::as_str) {
        Some(value) => Base64UrlUnpadded::decode_vec(value)
            .map_err(|e| Error::InvalidJwe(format!("issue decoding `{name}`: {e}"))),
        None => Ok(Vec::new()),
    }
}

fn party_info(header: &JoseHeader) -> Result<(Vec<u8>, Vec<u8>), Error> {
    Ok((optional_b64(header, "apu")?, optional_b64(header, "apv")?))
}

/// AES key wrap (RFC 3394) unwrapping, keyed by an AES key of the size the
/// algorithm dictates.
fn aes_unwrap(kek: &[u8], size: usize, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
    if kek.len() != size {
        return Err(Error::DecryptionFailed);
    }

    let cek = match size {
        16 => Kek::from(<[u8; 16]>::try_from(kek).map_err(|_| Error::DecryptionFailed)?)
            .unwrap_vec(wrapped),
        24 => Kek::from(<[u8; 24]>::try_from(kek).map_err(|_| Error::DecryptionFailed)?)
            .unwrap_vec(wrapped),
        _ => Kek::from(<[u8; 32]>::try_from(kek).map_err(|_| Error::DecryptionFailed)?)
            .unwrap_vec(wrapped),
    }
    .map_err(|_| Error::DecryptionFailed)?;

    Ok(Zeroizing::new(cek))
}

/// AES-GCM key unwrapping using the header-carried `iv` and `tag`, with no
/// additional data.
fn gcm_unwrap(
    kek: &[u8], size: usize, header: &JoseHeader, wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let iv = header_b64(header, "iv")?;
    let tag = header_b64(header, "tag")?;
    if kek.len() != size || iv.len() != 12 || tag.len() != 16 {
        return Err(Error::DecryptionFailed);
    }

    let mut buffer = wrapped.to_vec();
    let nonce = Nonce::from_slice(&iv);
    let tag = Tag::from_slice(&tag);

    match size {
        16 => Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(kek))
            .decrypt_in_place_detached(nonce, &[], &mut buffer, tag),
        24 => Aes192Gcm::new(Key::<Aes192Gcm>::from_slice(kek))
            .decrypt_in_place_detached(nonce, &[], &mut buffer, tag),
        _ => Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek))
            .decrypt_in_place_detached(nonce, &[], &mut buffer, tag),
    }
    .map_err(|_| Error::DecryptionFailed)?;

    Ok(Zeroizing::new(buffer))
}

fn rsa_unwrap(
    private_key: &rsa::RsaPrivateKey, padding: impl rsa::traits::PaddingScheme, wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let cek = private_key.decrypt(padding, wrapped).map_err(|_| Error::DecryptionFailed)?;
    Ok(Zeroizing::new(cek))
}

/// ECDH between the recipient's private key and the header-carried ephemeral
/// public key (`epk`). The key's variant fixes the expected curve; an `epk`
/// on any other curve cannot agree.
fn agree(key: &DecryptionKey, header: &JoseHeader) -> Result<Zeroizing<Vec<u8>>, Error> {
    let Some(epk) = header.get("epk") else {
        return Err(Error::InvalidJwe("JOSE header is missing the `epk` parameter".into()));
    };
    let epk: PublicKeyJwk = serde_json::from_value(epk.clone())
        .map_err(|e| Error::InvalidJwe(format!("issue deserializing `epk`: {e}")))?;

    match key {
        DecryptionKey::X25519(secret) => {
            check_curve(&epk, Curve::X25519)?;
            let x = Base64UrlUnpadded::decode_vec(&epk.x)
                .map_err(|e| Error::InvalidJwe(format!("issue decoding `epk` `x`: {e}")))?;
            let x: [u8; 32] =
                x.try_into().map_err(|_| Error::InvalidJwe("invalid `epk` key length".into()))?;
            let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(x));
            Ok(Zeroizing::new(shared.as_bytes().to_vec()))
        }
        DecryptionKey::P256(secret) => {
            check_curve(&epk, Curve::P256)?;
            let public = p256::PublicKey::from_sec1_bytes(&sec1_point(&epk, 32)?)
                .map_err(|e| Error::InvalidJwe(format!("issue parsing `epk`: {e}")))?;
            let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        DecryptionKey::P384(secret) => {
            check_curve(&epk, Curve::P384)?;
            let public = p384::PublicKey::from_sec1_bytes(&sec1_point(&epk, 48)?)
                .map_err(|e| Error::InvalidJwe(format!("issue parsing `epk`: {e}")))?;
            let shared = p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        DecryptionKey::P521(secret) => {
            check_curve(&epk, Curve::P521)?;
            let public = p521::PublicKey::from_sec1_bytes(&sec1_point(&epk, 66)?)
                .map_err(|e| Error::InvalidJwe(format!("issue parsing `epk`: {e}")))?;
            let shared = p521::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        }
        _ => Err(Error::InvalidKeyInput("expected an EC or X25519 private key".into())),
    }
}

fn check_curve(epk: &PublicKeyJwk, expected: Curve) -> Result<(), Error> {
    if epk.crv == expected {
        Ok(())
    } else {
        Err(Error::NotSupported("unsupported key curve for this operation".into()))
    }
}

/// Assemble an uncompressed SEC1 point from the JWK `x`/`y` coordinates,
/// left-padding each to the curve's field size.
fn sec1_point(epk: &PublicKeyJwk, size: usize) -> Result<Vec<u8>, Error> {
    let x = Base64UrlUnpadded::decode_vec(&epk.x)
        .map_err(|e| Error::InvalidJwe(format!("issue decoding `epk` `x`: {e}")))?;
    let Some(y) = &epk.y else {
        return Err(Error::InvalidJwe("`epk` is missing the `y` coordinate".into()));
    };
    let y = Base64UrlUnpadded::decode_vec(y)
        .map_err(|e| Error::InvalidJwe(format!("issue decoding `epk` `y`: {e}")))?;
    if x.len() > size || y.len() > size {
        return Err(Error::InvalidJwe("invalid `epk` coordinate length".into()));
    }

    let mut point = Vec::with_capacity(1 + 2 * size);
    point.push(TAG_PUBKEY_FULL);
    point.resize(1 + size - x.len(), 0);
    point.extend_from_slice(&x);
    point.resize(1 + 2 * size - y.len(), 0);
    point.extend_from_slice(&y);
    Ok(point)
}

/// Single-round Concat KDF (NIST SP 800-56A, Section 5.8.1), fixed to
/// SHA-256:
///
/// `SHA-256(be32(1) || Z || lenpfx(AlgorithmID) || lenpfx(PartyUInfo) ||
/// lenpfx(PartyVInfo) || be32(keydatalen))`
///
/// truncated to the requested length. One round bounds the output at 32
/// bytes; longer requests fail.
pub(super) fn concat_kdf(
    z: &[u8], algorithm: &str, key_len: usize, apu: &[u8], apv: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    if key_len > Sha256::output_size() {
        return Err(Error::DecryptionFailed);
    }

    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(z);
    hasher.update((algorithm.len() as u32).to_be_bytes());
    hasher.update(algorithm.as_bytes());
    hasher.update((apu.len() as u32).to_be_bytes());
    hasher.update(apu);
    hasher.update((apv.len() as u32).to_be_bytes());
    hasher.update(apv);
    hasher.update((key_len as u32 * 8).to_be_bytes());

    let digest = hasher.finalize();
    Ok(Zeroizing::new(digest[..key_len].to_vec()))
}

/// PBKDF2 key derivation for PBES2 (RFC 7518 Section 4.8): the salt is
/// `UTF8(alg) || 0x00 || p2s`, the PRF and derived key length follow from
/// the algorithm name.
fn pbes2_derive(
    alg: &KeyAlgorithm, password: &[u8], header: &JoseHeader, size: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let p2s = header_b64(header, "p2s")?;
    if p2s.len() < 8 {
        return Err(Error::InvalidJwe("PBES2 salt input (p2s) must be 8 or more octets".into()));
    }
    let Some(p2c) = header.get("p2c").and_then(Value::as_u64) else {
        return Err(Error::InvalidJwe("JOSE header is missing the `p2c` parameter".into()));
    };
    if p2c == 0 || p2c > u64::from(u32::MAX) {
        return Err(Error::InvalidJwe("invalid `p2c` parameter".into()));
    }

    let mut salt = Vec::with_capacity(alg.name().len() + 1 + p2s.len());
    salt.extend_from_slice(alg.name().as_bytes());
    salt.push(0);
    salt.extend_from_slice(&p2s);

    let mut derived = Zeroizing::new(vec![0u8; size]);
    match alg {
        KeyAlgorithm::Pbes2Hs256A128Kw => {
            pbkdf2::pbkdf2::<Hmac<Sha256>>(password, &salt, p2c as u32, &mut derived)
        }
        KeyAlgorithm::Pbes2Hs384A192Kw => {
            pbkdf2::pbkdf2::<Hmac<Sha384>>(password, &salt, p2c as u32, &mut derived)
        }
        _ => pbkdf2::pbkdf2::<Hmac<Sha512>>(password, &salt, p2c as u32, &mut derived),
    }
    .map_err(|_| Error::DecryptionFailed)?;

    Ok(derived)
}

#[cfg(test)]
mod test {
    use rand::rngs::OsRng;
    use serde_json::json;

    use super::*;

    // RFC 7518 Appendix C: ECDH-ES key agreement, apu "Alice", apv "Bob",
    // enc "A128GCM" derives the key "VqqN6vgjbSBcIijNcacQGg".
    #[test]
    fn concat_kdf_rfc7518_c() {
        let z = [
            158, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251, 49,
            110, 163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
        ];
        let derived = concat_kdf(&z, "A128GCM", 16, b"Alice", b"Bob").expect("should derive");
        assert_eq!(Base64UrlUnpadded::encode_string(&derived), "VqqN6vgjbSBcIijNcacQGg");
    }

    #[test]
    fn concat_kdf_bounded_by_one_round() {
        let result = concat_kdf(&[0u8; 32], "A256CBC-HS512", 64, &[], &[]);
        assert!(matches!(result, Err(Error::DecryptionFailed)));
    }

    // a wrong-kind key surfaces immediately, everything else is masked
    #[test]
    fn masking_policy() {
        let header = JoseHeader::new();
        let enc = EncAlgorithm::A256Gcm;

        // symmetric key with an RSA algorithm: caller error, not masked
        let key = DecryptionKey::symmetric(vec![0u8; 32]);
        let result =
            deduce_cek(&KeyAlgorithm::RsaOaep256, &enc, &key, Some("AAAA"), &header, &mut OsRng);
        assert!(matches!(result, Err(Error::InvalidKeyInput(_))));

        // undecodable encrypted key: masked with a random, correctly sized CEK
        let key = DecryptionKey::symmetric(vec![0u8; 16]);
        let cek = deduce_cek(&KeyAlgorithm::A128Kw, &enc, &key, Some("!!!"), &header, &mut OsRng)
            .expect("should mask");
        assert_eq!(cek.len(), enc.key_size());

        // missing encrypted key where one is required: masked as well
        let cek = deduce_cek(&KeyAlgorithm::A128Kw, &enc, &key, None, &header, &mut OsRng)
            .expect("should mask");
        assert_eq!(cek.len(), enc.key_size());

        // missing epk for ECDH-ES: masked
        let key = DecryptionKey::X25519(x25519_dalek::StaticSecret::random_from_rng(OsRng));
        let cek = deduce_cek(&KeyAlgorithm::EcdhEs, &enc, &key, None, &header, &mut OsRng)
            .expect("should mask");
        assert_eq!(cek.len(), enc.key_size());
    }

    #[test]
    fn direct_key_is_the_cek() {
        let key = DecryptionKey::symmetric(vec![7u8; 32]);
        let cek = deduce_cek(
            &KeyAlgorithm::Dir,
            &EncAlgorithm::A256Gcm,
            &key,
            None,
            &JoseHeader::new(),
            &mut OsRng,
        )
        .expect("should resolve");
        assert_eq!(*cek, vec![7u8; 32]);
    }

    #[test]
    fn aes_kw_round_trip() {
        let kek = [1u8; 16];
        let cek = [2u8; 32];
        let wrapped = Kek::from(kek).wrap_vec(&cek).unwrap();

        let unwrapped = aes_unwrap(&kek, 16, &wrapped).expect("should unwrap");
        assert_eq!(*unwrapped, cek);

        // a wrong KEK is a decryption failure before masking applies
        let result = aes_unwrap(&[9u8; 16], 16, &wrapped);
        assert!(matches!(result, Err(Error::DecryptionFailed)));
    }

    #[test]
    fn x25519_agreement() {
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let ephemeral = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);

        let mut header = JoseHeader::new();
        header.insert(
            "epk".to_string(),
            json!({
                "kty": "OKP",
                "crv": "X25519",
                "x": Base64UrlUnpadded::encode_string(ephemeral_public.as_bytes()),
            }),
        );

        let z = agree(&DecryptionKey::X25519(secret.clone()), &header).expect("should agree");
        let expected = ephemeral.diffie_hellman(&x25519_dalek::PublicKey::from(&secret));
        assert_eq!(*z, expected.as_bytes().to_vec());
    }

    #[test]
    fn curve_mismatch() {
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let mut header = JoseHeader::new();
        header.insert(
            "epk".to_string(),
            json!({ "kty": "EC", "crv": "P-256", "x": "AA", "y": "AA" }),
        );

        let result = agree(&DecryptionKey::X25519(secret), &header);
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }
}
