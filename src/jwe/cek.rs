//! # Content Encryption Key Generation

use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use super::EncAlgorithm;

/// Generate a fresh random CEK sized for the content encryption algorithm.
///
/// This is the substitute key used when key management fails: decryption
/// carries on with it so that the eventual tag check fails with the same
/// observable error and timing as a genuine unwrap failure.
pub(super) fn generate(
    enc: &EncAlgorithm, rng: &mut (impl RngCore + CryptoRng),
) -> Zeroizing<Vec<u8>> {
    let mut cek = Zeroizing::new(vec![0u8; enc.key_size()]);
    rng.fill_bytes(&mut cek);
    cek
}
