//! AES-GCM encryption and decryption of byte strings to textual tokens.
//!
//! The key length selects AES-128, AES-192 or AES-256. Every call to
//! [`CipherCodec::encrypt`] draws a fresh 96-bit IV from the OS CSPRNG; an IV
//! is never reused under the same key, including when a caller retries.

use std::fmt;

use aes_gcm::{
    aead::{
        consts::U12, generic_array::GenericArray, rand_core::RngCore, AeadInPlace, KeyInit, OsRng,
    },
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::token::{EncryptedToken, IV_LEN, TAG_LEN};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Key lengths accepted by [`CipherCodec::new`], in bytes.
pub const KEY_LENS: [usize; 3] = [16, 24, 32];

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is not 16, 24 or 32 bytes long.
    #[error("invalid key length: expected 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// A base64-encoded key could not be decoded.
    #[error("invalid key encoding: expected standard base64")]
    InvalidKeyEncoding,

    /// The token string is malformed.
    #[error("invalid token format: {0}")]
    Format(&'static str),

    /// Tag verification failed: wrong key, or tampered ciphertext, IV or tag.
    #[error("authentication failed")]
    Authentication,

    /// AEAD encryption refused the input.
    #[error("aead seal failed")]
    Seal,
}

#[derive(Clone)]
enum Aes {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// Authenticated encryption of byte strings under one symmetric key.
///
/// Holds only immutable key material, so a single codec can be shared by
/// reference across threads and tasks.
#[derive(Clone)]
pub struct CipherCodec {
    aes: Aes,
}

impl CipherCodec {
    /// Build a codec from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] unless `key` is 16, 24 or 32
    /// bytes long.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let invalid = |_| CipherError::InvalidKeyLength(key.len());
        let aes = match key.len() {
            16 => Aes::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?),
            24 => Aes::Aes192(Aes192Gcm::new_from_slice(key).map_err(invalid)?),
            32 => Aes::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?),
            n => return Err(CipherError::InvalidKeyLength(n)),
        };
        Ok(Self { aes })
    }

    /// Build a codec from a standard-base64 encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyEncoding`] if `encoded` is not valid
    /// base64, or [`CipherError::InvalidKeyLength`] if the decoded key has the
    /// wrong length.
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let key = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| CipherError::InvalidKeyEncoding)?,
        );
        Self::new(&key)
    }

    /// Encrypt `plaintext` into a token string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Seal`] if the AEAD implementation rejects the
    /// input (only reachable for plaintexts far beyond GCM's length limit).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        self.seal(plaintext).map(|token| token.to_string())
    }

    /// Encrypt `plaintext` into a parsed [`EncryptedToken`].
    ///
    /// # Errors
    ///
    /// See [`CipherCodec::encrypt`].
    pub fn seal(&self, plaintext: &[u8]) -> Result<EncryptedToken, CipherError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut ciphertext = plaintext.to_vec();
        let tag = match &self.aes {
            Aes::Aes128(c) => seal_in_place(c, &iv, &mut ciphertext)?,
            Aes::Aes192(c) => seal_in_place(c, &iv, &mut ciphertext)?,
            Aes::Aes256(c) => seal_in_place(c, &iv, &mut ciphertext)?,
        };

        Ok(EncryptedToken {
            ciphertext,
            iv,
            tag,
        })
    }

    /// Decrypt a token string back to plaintext bytes.
    ///
    /// Either the full original plaintext is returned or an error; partially
    /// decrypted output is never exposed.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Format`] if the token is malformed, and
    /// [`CipherError::Authentication`] if the tag does not verify.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, CipherError> {
        let token: EncryptedToken = token.parse()?;
        self.open(&token)
    }

    /// Decrypt an already parsed token.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Authentication`] if the tag does not verify.
    pub fn open(&self, token: &EncryptedToken) -> Result<Vec<u8>, CipherError> {
        let mut buf = Zeroizing::new(token.ciphertext.clone());
        match &self.aes {
            Aes::Aes128(c) => open_in_place(c, &token.iv, &token.tag, &mut buf)?,
            Aes::Aes192(c) => open_in_place(c, &token.iv, &token.tag, &mut buf)?,
            Aes::Aes256(c) => open_in_place(c, &token.iv, &token.tag, &mut buf)?,
        }
        Ok(std::mem::take(&mut *buf))
    }

    /// Human-readable name of the selected cipher, e.g. `"AES-256-GCM"`.
    pub fn algorithm(&self) -> &'static str {
        match self.aes {
            Aes::Aes128(_) => "AES-128-GCM",
            Aes::Aes192(_) => "AES-192-GCM",
            Aes::Aes256(_) => "AES-256-GCM",
        }
    }
}

impl fmt::Debug for CipherCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_struct("CipherCodec")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

fn seal_in_place<C: AeadInPlace>(
    cipher: &C,
    iv: &[u8; IV_LEN],
    buf: &mut [u8],
) -> Result<[u8; TAG_LEN], CipherError> {
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), b"", buf)
        .map_err(|_| CipherError::Seal)?;
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&tag);
    Ok(out)
}

fn open_in_place<C: AeadInPlace>(
    cipher: &C,
    iv: &[u8; IV_LEN],
    tag: &[u8; TAG_LEN],
    buf: &mut [u8],
) -> Result<(), CipherError> {
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            b"",
            buf,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CipherError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key(len: usize) -> Vec<u8> {
        let mut key = vec![0u8; len];
        OsRng.fill_bytes(&mut key);
        key
    }

    fn codec() -> CipherCodec {
        CipherCodec::new(&random_key(32)).unwrap()
    }

    fn tamper(token: &str, f: impl FnOnce(&mut EncryptedToken)) -> String {
        let mut parsed: EncryptedToken = token.parse().unwrap();
        f(&mut parsed);
        parsed.to_string()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let c = codec();
        let plaintext = b"123-45-6789";
        let token = c.encrypt(plaintext).unwrap();
        assert_eq!(c.decrypt(&token).unwrap(), plaintext);
    }

    #[test]
    fn round_trip_empty_plaintext() {
        let c = codec();
        let token = c.encrypt(b"").unwrap();
        assert_eq!(c.decrypt(&token).unwrap(), b"");
    }

    #[test]
    fn round_trip_every_key_size() {
        for len in KEY_LENS {
            let c = CipherCodec::new(&random_key(len)).unwrap();
            let token = c.encrypt(b"payload").unwrap();
            assert_eq!(c.decrypt(&token).unwrap(), b"payload", "key length {len}");
        }
    }

    #[test]
    fn algorithm_follows_key_length() {
        assert_eq!(CipherCodec::new(&[0u8; 16]).unwrap().algorithm(), "AES-128-GCM");
        assert_eq!(CipherCodec::new(&[0u8; 24]).unwrap().algorithm(), "AES-192-GCM");
        assert_eq!(CipherCodec::new(&[0u8; 32]).unwrap().algorithm(), "AES-256-GCM");
    }

    #[test]
    fn invalid_key_length_rejected() {
        for len in [0, 1, 15, 17, 31, 33, 64] {
            assert!(matches!(
                CipherCodec::new(&vec![0u8; len]),
                Err(CipherError::InvalidKeyLength(n)) if n == len
            ));
        }
    }

    #[test]
    fn from_base64_accepts_encoded_key() {
        // "change this password to a secret"
        let encoded = STANDARD.encode(b"change this password to a secret");
        let c = CipherCodec::from_base64(&encoded).unwrap();
        assert_eq!(c.algorithm(), "AES-256-GCM");
    }

    #[test]
    fn from_base64_rejects_bad_input() {
        assert!(matches!(
            CipherCodec::from_base64("abc"),
            Err(CipherError::InvalidKeyEncoding)
        ));
        assert!(matches!(
            CipherCodec::from_base64(&STANDARD.encode([0u8; 20])),
            Err(CipherError::InvalidKeyLength(20))
        ));
    }

    #[test]
    fn fresh_iv_per_call() {
        let c = codec();
        let a: EncryptedToken = c.encrypt(b"same").unwrap().parse().unwrap();
        let b: EncryptedToken = c.encrypt(b"same").unwrap().parse().unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn ciphertext_excludes_tag() {
        let c = codec();
        let token = c.seal(b"twelve bytes").unwrap();
        assert_eq!(token.ciphertext.len(), b"twelve bytes".len());
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let token = codec().encrypt(b"secret").unwrap();
        assert!(matches!(
            codec().decrypt(&token),
            Err(CipherError::Authentication)
        ));
    }

    #[test]
    fn single_bit_flips_fail_authentication() {
        let c = codec();
        let token = c.encrypt(b"tamper me").unwrap();
        let len = b"tamper me".len();

        for byte in 0..len {
            for bit in 0..8 {
                let bad = tamper(&token, |t| t.ciphertext[byte] ^= 1 << bit);
                assert!(matches!(c.decrypt(&bad), Err(CipherError::Authentication)));
            }
        }
        for byte in 0..IV_LEN {
            for bit in 0..8 {
                let bad = tamper(&token, |t| t.iv[byte] ^= 1 << bit);
                assert!(matches!(c.decrypt(&bad), Err(CipherError::Authentication)));
            }
        }
        for byte in 0..TAG_LEN {
            for bit in 0..8 {
                let bad = tamper(&token, |t| t.tag[byte] ^= 1 << bit);
                assert!(matches!(c.decrypt(&bad), Err(CipherError::Authentication)));
            }
        }
    }

    #[test]
    fn malformed_token_is_format_error() {
        let c = codec();
        let token = c.encrypt(b"x").unwrap();
        let (first, _) = token.split_once(crate::token::SEPARATOR).unwrap();
        for bad in [first.to_owned(), format!("{token}|$|"), "%%%|$|%%%|$|%%%".to_owned()] {
            assert!(matches!(c.decrypt(&bad), Err(CipherError::Format(_))));
        }
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = [0xABu8; 32];
        let rendered = format!("{:?}", CipherCodec::new(&key).unwrap());
        assert!(rendered.contains("AES-256-GCM"));
        assert!(!rendered.to_lowercase().contains("ab, ab"));
        assert!(!rendered.contains("171"));
    }

    #[test]
    fn codec_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CipherCodec>();

        let c = std::sync::Arc::new(codec());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let c = c.clone();
                std::thread::spawn(move || {
                    let msg = format!("thread {i}");
                    let token = c.encrypt(msg.as_bytes()).unwrap();
                    assert_eq!(c.decrypt(&token).unwrap(), msg.as_bytes());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
