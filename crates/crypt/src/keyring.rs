//! Current and previous codecs held side by side during key rotation.

use crate::cipher::{CipherCodec, CipherError};

/// A pair of independently constructed codecs.
///
/// New data is always written under `current`. Reads try `current` first and
/// fall back to `previous` only on an authentication failure, so data written
/// before a rotation stays readable until it has been re-encrypted.
#[derive(Debug, Clone)]
pub struct KeyRing {
    current: CipherCodec,
    previous: Option<CipherCodec>,
}

impl KeyRing {
    /// A key ring with no rotation in progress.
    pub fn new(current: CipherCodec) -> Self {
        Self {
            current,
            previous: None,
        }
    }

    /// A key ring that can still read data written under `previous`.
    pub fn rotating(current: CipherCodec, previous: CipherCodec) -> Self {
        Self {
            current,
            previous: Some(previous),
        }
    }

    /// Codec used for all new encryptions.
    pub fn current(&self) -> &CipherCodec {
        &self.current
    }

    /// Codec for data written before the rotation, if one is in progress.
    pub fn previous(&self) -> Option<&CipherCodec> {
        self.previous.as_ref()
    }

    /// Encrypt under the current key.
    ///
    /// # Errors
    ///
    /// See [`CipherCodec::encrypt`].
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        self.current.encrypt(plaintext)
    }

    /// Decrypt with the current key, then with the previous key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Format`] immediately for a malformed token, and
    /// [`CipherError::Authentication`] if neither key verifies the tag.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, CipherError> {
        match self.current.decrypt(token) {
            Err(CipherError::Authentication) => match &self.previous {
                Some(previous) => previous.decrypt(token),
                None => Err(CipherError::Authentication),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn old_key() -> CipherCodec {
        CipherCodec::new(&[0x01u8; 32]).unwrap()
    }

    fn new_key() -> CipherCodec {
        CipherCodec::new(&[0x02u8; 32]).unwrap()
    }

    #[test]
    fn old_token_fails_under_new_key_alone() {
        let token = old_key().encrypt(b"legacy").unwrap();
        let ring = KeyRing::new(new_key());
        assert!(matches!(
            ring.decrypt(&token),
            Err(CipherError::Authentication)
        ));
    }

    #[test]
    fn old_token_decrypts_with_previous_key() {
        let token = old_key().encrypt(b"legacy").unwrap();
        let ring = KeyRing::rotating(new_key(), old_key());
        assert_eq!(ring.decrypt(&token).unwrap(), b"legacy");
    }

    #[test]
    fn new_writes_use_current_key() {
        let ring = KeyRing::rotating(new_key(), old_key());
        let token = ring.encrypt(b"fresh").unwrap();
        assert_eq!(new_key().decrypt(&token).unwrap(), b"fresh");
        assert!(old_key().decrypt(&token).is_err());
    }

    #[test]
    fn malformed_token_does_not_fall_back() {
        let ring = KeyRing::rotating(new_key(), old_key());
        assert!(matches!(ring.decrypt("bogus"), Err(CipherError::Format(_))));
    }

    #[test]
    fn previous_present_only_while_rotating() {
        assert!(KeyRing::new(new_key()).previous().is_none());
        let ring = KeyRing::rotating(new_key(), CipherCodec::new(&[0x01u8; 16]).unwrap());
        assert_eq!(ring.current().algorithm(), "AES-256-GCM");
        assert_eq!(ring.previous().map(CipherCodec::algorithm), Some("AES-128-GCM"));
    }
}
