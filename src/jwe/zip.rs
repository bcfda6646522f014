//! # Plaintext Decompression
//!
//! The `zip` header parameter requests decompression of the decrypted
//! plaintext. Only raw DEFLATE (`DEF`) is defined by RFC 7516. Inflation
//! runs strictly after the authentication tag has been verified, so a
//! malformed stream carries no timing-oracle risk.

use std::io::Read;
use std::sync::Arc;

use flate2::read::DeflateDecoder;

use crate::error::Error;

/// Caller-supplied replacement for the raw DEFLATE decompression step.
pub type InflateFn = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, Error> + Send + Sync>;

/// Decompress a raw DEFLATE stream.
pub(super) fn inflate(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut plaintext = Vec::new();
    DeflateDecoder::new(data)
        .read_to_end(&mut plaintext)
        .map_err(|e| Error::InvalidJwe(format!("issue inflating plaintext: {e}")))?;
    Ok(plaintext)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::DeflateEncoder;

    use super::*;

    #[test]
    fn round_trip() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"You can trust us to stick with you through thick and thin.").unwrap();
        let compressed = encoder.finish().unwrap();

        let inflated = inflate(&compressed).expect("should inflate");
        assert_eq!(inflated, b"You can trust us to stick with you through thick and thin.");
    }

    #[test]
    fn garbage_stream() {
        let result = inflate(&[0xff, 0x00, 0xab, 0xcd]);
        assert!(matches!(result, Err(Error::InvalidJwe(_))));
    }
}
