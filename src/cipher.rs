//! Session-bound cipher service.
//!
//! Provides authenticated encryption (XChaCha20-Poly1305) and a keyed digest
//! (HMAC-SHA256) over per-session key material, plus optional deflate
//! compression of state payloads. The AEAD is instantiated fresh on every
//! call, so the service is safe under concurrent requests of one session
//! without any internal locking.

use std::io::Read;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::EngineError;

/// XChaCha20 nonce length in bytes.
const NONCE_LEN: usize = 24;

/// Decompression cap. A state payload is a handful of form fields; anything
/// expanding past this is not a legitimate token.
const MAX_PLAINTEXT_LEN: u64 = 1 << 20;

/// Failure while processing client-supplied cipher input.
///
/// Every variant is expected adversarial input on the decode path; the codec
/// maps them to the tamper-error catalog, never to a fault.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Ciphertext too short or authentication failed.
    #[error("decryption failed")]
    DecryptionFailed,
    /// Compressed payload failed to inflate within bounds.
    #[error("decompression failed")]
    DecompressionFailed,
    /// Keyed digest did not match.
    #[error("digest mismatch")]
    DigestMismatch,
}

/// Per-session key material for token encryption and digests.
///
/// Generated lazily the first time a session needs it, held only in
/// server-side session state, never transmitted. Both keys are zeroized on
/// drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SessionKey {
    cipher_key: [u8; 32],
    digest_key: [u8; 32],
}

impl SessionKey {
    /// Generates fresh random key material.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut cipher_key = [0u8; 32];
        let mut digest_key = [0u8; 32];
        rng.fill_bytes(&mut cipher_key);
        rng.fill_bytes(&mut digest_key);
        Self {
            cipher_key,
            digest_key,
        }
    }

    /// Encrypts a payload, returning `nonce || ciphertext`.
    ///
    /// A fresh random 192-bit nonce is drawn per call, which is safe to do
    /// with XChaCha20's extended nonce space.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CipherFailure`] if encryption itself fails;
    /// this is a server-side fault, not client tampering.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EngineError> {
        let cipher = XChaCha20Poly1305::new((&self.cipher_key).into());
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| EngineError::CipherFailure(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts a `nonce || ciphertext` payload.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::DecryptionFailed`] on any corruption: short
    /// input, bad nonce, failed authentication tag.
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, CipherError> {
        if payload.len() <= NONCE_LEN {
            return Err(CipherError::DecryptionFailed);
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new((&self.cipher_key).into());
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::DecryptionFailed)
    }

    /// Computes the keyed digest of a payload.
    pub fn digest(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.digest_key)
            .expect("HMAC accepts any key length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Verifies a keyed digest in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::DigestMismatch`] when the digest does not
    /// match the payload.
    pub fn verify_digest(&self, payload: &[u8], digest: &[u8]) -> Result<(), CipherError> {
        let expected = self.digest(payload);
        if expected.ct_eq(digest).into() {
            Ok(())
        } else {
            Err(CipherError::DigestMismatch)
        }
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes never reach logs.
        f.write_str("SessionKey([REDACTED])")
    }
}

/// Deflate-compresses a payload.
///
/// Compression is an optimization for token size, not a security property;
/// callers may skip it entirely (`Config::compress_state`).
pub fn compress(payload: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut encoder = DeflateEncoder::new(payload, Compression::default());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .map_err(|e| EngineError::CipherFailure(format!("compression failed: {}", e)))?;
    Ok(out)
}

/// Inflates a deflate-compressed payload, bounded by [`MAX_PLAINTEXT_LEN`].
///
/// # Errors
///
/// Returns [`CipherError::DecompressionFailed`] on corrupt input or when
/// the output would exceed the bound.
pub fn decompress(payload: &[u8]) -> Result<Vec<u8>, CipherError> {
    let mut decoder = DeflateDecoder::new(payload).take(MAX_PLAINTEXT_LEN + 1);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| CipherError::DecompressionFailed)?;
    if out.len() as u64 > MAX_PLAINTEXT_LEN {
        return Err(CipherError::DecompressionFailed);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = SessionKey::generate();
        let plaintext = b"state payload";

        let sealed = key.encrypt(plaintext).unwrap();
        let opened = key.decrypt(&sealed).unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let key = SessionKey::generate();
        let other = SessionKey::generate();

        let sealed = key.encrypt(b"payload").unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = SessionKey::generate();
        let mut sealed = key.encrypt(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(key.decrypt(&sealed).is_err());
    }

    #[test]
    fn truncated_payload_fails() {
        let key = SessionKey::generate();
        assert!(key.decrypt(&[0u8; NONCE_LEN]).is_err());
        assert!(key.decrypt(&[]).is_err());
    }

    #[test]
    fn digest_round_trip_and_mismatch() {
        let key = SessionKey::generate();
        let digest = key.digest(b"payload");

        assert!(key.verify_digest(b"payload", &digest).is_ok());
        assert!(key.verify_digest(b"payloaD", &digest).is_err());
        assert!(key.verify_digest(b"payload", &digest[1..]).is_err());
    }

    #[test]
    fn digest_keys_differ_between_sessions() {
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        assert_ne!(a.digest(b"x"), b.digest(b"x"));
    }

    #[test]
    fn compression_round_trip() {
        let payload = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(8);
        let packed = compress(&payload).unwrap();
        let unpacked = decompress(&packed).unwrap();

        assert_eq!(unpacked, payload);
        assert!(packed.len() < payload.len());
    }

    #[test]
    fn corrupt_compressed_payload_fails() {
        assert!(decompress(&[0xff, 0xff, 0xff, 0x00]).is_err());
    }

    #[test]
    fn debug_output_redacts_key_material() {
        let key = SessionKey::generate();
        assert_eq!(format!("{:?}", key), "SessionKey([REDACTED])");
    }
}
