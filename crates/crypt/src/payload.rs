//! Selective-field payload encryption.
//!
//! Whitelisted fields stay in plaintext; every other field is moved into one
//! JSON object that is encrypted as a single token and stored under
//! [`ENCRYPTED_PAYLOAD`].

use common::{Payload, Value, Whitelist};
use thiserror::Error;

use crate::cipher::{CipherCodec, CipherError};
use crate::keyring::KeyRing;

/// Reserved field name holding the encrypted remainder of a payload.
///
/// Its presence always signals an encrypted remainder; it is never a
/// legitimate plaintext field.
pub const ENCRYPTED_PAYLOAD: &str = "ENCRYPTED_PAYLOAD";

/// Errors produced by the payload codec.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The underlying token codec failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// The remainder could not be serialised, or the decrypted bytes are not a
    /// JSON object.
    #[error("payload serialisation failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A plaintext payload already carries the reserved field.
    #[error("payload already contains reserved field {ENCRYPTED_PAYLOAD}")]
    ReservedField,

    /// The reserved field is present but is not a string token.
    #[error("{ENCRYPTED_PAYLOAD} must be a string token")]
    MalformedField,
}

/// Encrypts the non-whitelisted remainder of a [`Payload`] as one token.
///
/// Payloads are sealed under the key ring's current key. Opening also accepts
/// the previous key while a rotation is in progress.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    keys: KeyRing,
}

impl PayloadCodec {
    /// Wrap a single token codec.
    pub fn new(cipher: CipherCodec) -> Self {
        Self::with_ring(KeyRing::new(cipher))
    }

    /// Seal under `keys.current()`; open with the current, then the previous key.
    pub fn with_ring(keys: KeyRing) -> Self {
        Self { keys }
    }

    /// The codec new payloads are sealed with.
    pub fn cipher(&self) -> &CipherCodec {
        self.keys.current()
    }

    /// The keys this codec opens payloads with.
    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// Encrypt every field of `payload` not named in `whitelist`.
    ///
    /// When nothing is left to encrypt the whitelisted fields are returned
    /// as-is and no [`ENCRYPTED_PAYLOAD`] field is added. The input is never
    /// modified.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::ReservedField`] if `payload` already contains
    /// [`ENCRYPTED_PAYLOAD`], or the serialisation / cipher error that
    /// occurred.
    pub fn encrypt_payload(
        &self,
        payload: &Payload,
        whitelist: &Whitelist,
    ) -> Result<Payload, PayloadError> {
        if payload.contains_key(ENCRYPTED_PAYLOAD) {
            return Err(PayloadError::ReservedField);
        }

        let (mut kept, remainder): (Payload, Payload) = payload
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .partition(|(k, _)| whitelist.contains(k));

        if !remainder.is_empty() {
            let json = serde_json::to_vec(&remainder)?;
            let token = self.keys.encrypt(&json)?;
            kept.insert(ENCRYPTED_PAYLOAD.to_owned(), Value::String(token));
        }
        Ok(kept)
    }

    /// Reverse [`PayloadCodec::encrypt_payload`].
    ///
    /// A payload without [`ENCRYPTED_PAYLOAD`] is returned unchanged, so
    /// decrypting an already-plaintext record is safe. Decrypted fields take
    /// precedence over same-named plaintext fields.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::MalformedField`] if the reserved field is not a
    /// string, [`PayloadError::Cipher`] if the token is malformed or fails
    /// authentication under every key of the ring, and
    /// [`PayloadError::Serialization`] if the decrypted
    /// bytes are not a JSON object.
    pub fn decrypt_payload(&self, payload: &Payload) -> Result<Payload, PayloadError> {
        let Some(field) = payload.get(ENCRYPTED_PAYLOAD) else {
            return Ok(payload.clone());
        };
        let token = field.as_str().ok_or(PayloadError::MalformedField)?;

        let plaintext = self.keys.decrypt(token)?;
        let remainder: Payload = serde_json::from_slice(&plaintext)?;

        let mut merged = payload.clone();
        merged.extend(remainder);
        merged.remove(ENCRYPTED_PAYLOAD);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> PayloadCodec {
        PayloadCodec::new(CipherCodec::new(b"change this password to a secret").unwrap())
    }

    fn payload(v: serde_json::Value) -> Payload {
        serde_json::from_value(v).unwrap()
    }

    fn whitelist(fields: &[&str]) -> Whitelist {
        fields.iter().copied().collect()
    }

    #[test]
    fn fully_whitelisted_payload_gets_no_reserved_field() {
        let p = payload(json!({"a": 1}));
        let out = codec().encrypt_payload(&p, &whitelist(&["a"])).unwrap();
        assert_eq!(out, p);
        assert!(!out.contains_key(ENCRYPTED_PAYLOAD));
    }

    #[test]
    fn empty_payload_stays_empty() {
        let out = codec()
            .encrypt_payload(&Payload::new(), &Whitelist::new())
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn remainder_is_encrypted_and_restored() {
        let c = codec();
        let p = payload(json!({"a": 1, "b": 2}));
        let enc = c.encrypt_payload(&p, &whitelist(&["a"])).unwrap();

        assert_eq!(enc.len(), 2);
        assert_eq!(enc["a"], Value::from(1i64));
        assert!(enc[ENCRYPTED_PAYLOAD].as_str().is_some());
        assert!(!enc.contains_key("b"));

        let dec = c.decrypt_payload(&enc).unwrap();
        assert_eq!(dec, p);
    }

    #[test]
    fn nested_values_keep_their_kind() {
        let c = codec();
        let p = payload(json!({
            "should-encrypt": {"word": "string", "n": 3, "f": 0.5, "list": [true, null]},
            "should-not-encrypt": {"word": "other"},
            "also-should-not-encrypt": "word"
        }));
        let w = whitelist(&["should-not-encrypt", "also-should-not-encrypt", "should-not-encrypt"]);
        let enc = c.encrypt_payload(&p, &w).unwrap();
        assert!(!enc.contains_key("should-encrypt"));
        assert!(enc.contains_key("should-not-encrypt"));
        assert!(enc.contains_key("also-should-not-encrypt"));

        let dec = c.decrypt_payload(&enc).unwrap();
        assert!(!dec.contains_key(ENCRYPTED_PAYLOAD));
        assert_eq!(dec, p);
    }

    #[test]
    fn decrypt_without_reserved_field_is_identity() {
        let p = payload(json!({"x": "y", "n": [1, 2]}));
        assert_eq!(codec().decrypt_payload(&p).unwrap(), p);
    }

    #[test]
    fn decrypted_fields_shadow_plaintext() {
        let c = codec();
        let enc = c
            .encrypt_payload(&payload(json!({"b": "secret"})), &Whitelist::new())
            .unwrap();
        let mut tampered = enc.clone();
        tampered.insert("b".into(), Value::from("plaintext"));

        let dec = c.decrypt_payload(&tampered).unwrap();
        assert_eq!(dec["b"], Value::from("secret"));
    }

    #[test]
    fn input_with_reserved_field_rejected() {
        let p = payload(json!({"ENCRYPTED_PAYLOAD": "x", "a": 1}));
        assert!(matches!(
            codec().encrypt_payload(&p, &whitelist(&["a"])),
            Err(PayloadError::ReservedField)
        ));
    }

    #[test]
    fn non_string_reserved_field_rejected() {
        let p = payload(json!({"ENCRYPTED_PAYLOAD": 5}));
        assert!(matches!(
            codec().decrypt_payload(&p),
            Err(PayloadError::MalformedField)
        ));
    }

    #[test]
    fn wrong_key_fails_without_partial_merge() {
        let enc = codec()
            .encrypt_payload(&payload(json!({"a": 1, "b": 2})), &whitelist(&["a"]))
            .unwrap();
        let other = PayloadCodec::new(CipherCodec::new(&[1u8; 32]).unwrap());
        assert!(matches!(
            other.decrypt_payload(&enc),
            Err(PayloadError::Cipher(CipherError::Authentication))
        ));
    }

    #[test]
    fn malformed_token_is_format_error() {
        let p = payload(json!({"ENCRYPTED_PAYLOAD": "not-a-token"}));
        assert!(matches!(
            codec().decrypt_payload(&p),
            Err(PayloadError::Cipher(CipherError::Format(_)))
        ));
    }

    #[test]
    fn non_object_plaintext_is_serialization_error() {
        let c = codec();
        let token = c.cipher().encrypt(b"[1,2,3]").unwrap();
        let mut p = Payload::new();
        p.insert(ENCRYPTED_PAYLOAD.into(), Value::String(token));
        assert!(matches!(
            c.decrypt_payload(&p),
            Err(PayloadError::Serialization(_))
        ));
    }

    #[test]
    fn payload_sealed_before_rotation_opens_through_ring() {
        let old = CipherCodec::new(&[0x01u8; 32]).unwrap();
        let new = CipherCodec::new(&[0x02u8; 32]).unwrap();
        let p = payload(json!({"a": 1, "b": 2}));
        let sealed = PayloadCodec::new(old.clone())
            .encrypt_payload(&p, &whitelist(&["a"]))
            .unwrap();

        assert!(matches!(
            PayloadCodec::new(new.clone()).decrypt_payload(&sealed),
            Err(PayloadError::Cipher(CipherError::Authentication))
        ));

        let rotating = PayloadCodec::with_ring(KeyRing::rotating(new.clone(), old));
        assert!(rotating.keys().previous().is_some());
        assert_eq!(rotating.decrypt_payload(&sealed).unwrap(), p);

        // New payloads are sealed under the current key only.
        let resealed = rotating.encrypt_payload(&p, &whitelist(&["a"])).unwrap();
        assert_eq!(
            PayloadCodec::new(new).decrypt_payload(&resealed).unwrap(),
            p
        );
    }
}
