//! Textual wire form of an encrypted blob.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::cipher::CipherError;

/// Byte length of an AES-GCM initialisation vector (96 bits).
pub const IV_LEN: usize = 12;

/// Byte length of an AES-GCM authentication tag (128 bits).
pub const TAG_LEN: usize = 16;

/// Separator between the three base64 parts of a token.
pub const SEPARATOR: &str = "|$|";

/// A parsed encrypted token: ciphertext, IV and tag kept apart.
///
/// The string representation is
/// `base64(ciphertext)|$|base64(iv)|$|base64(tag)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedToken {
    /// Raw ciphertext bytes, without the tag. Same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// Raw IV bytes.
    pub iv: [u8; IV_LEN],
    /// Raw authentication tag bytes.
    pub tag: [u8; TAG_LEN],
}

impl fmt::Display for EncryptedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            STANDARD.encode(&self.ciphertext),
            STANDARD.encode(self.iv),
            STANDARD.encode(self.tag),
        )
    }
}

impl FromStr for EncryptedToken {
    type Err = CipherError;

    /// Parse a token string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Format`] if the string does not split into
    /// exactly three parts, if any part is not valid base64, or if the IV or
    /// tag has the wrong length.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        let [ciphertext, iv, tag] = parts.as_slice() else {
            return Err(CipherError::Format("token must have exactly three parts"));
        };

        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|_| CipherError::Format("ciphertext is not valid base64"))?;
        let iv = decode_fixed::<IV_LEN>(iv, "iv is not valid base64", "iv has wrong length")?;
        let tag = decode_fixed::<TAG_LEN>(tag, "tag is not valid base64", "tag has wrong length")?;

        Ok(Self {
            ciphertext,
            iv,
            tag,
        })
    }
}

fn decode_fixed<const N: usize>(
    part: &str,
    bad_encoding: &'static str,
    bad_length: &'static str,
) -> Result<[u8; N], CipherError> {
    let bytes = STANDARD
        .decode(part)
        .map_err(|_| CipherError::Format(bad_encoding))?;
    bytes
        .try_into()
        .map_err(|_| CipherError::Format(bad_length))
}
