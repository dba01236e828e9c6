//! Credential vault — AES-256-GCM encryption for processor tokens
//!
//! Tokens are stored as `ivHex:authTagHex:cipherHex` with a 16-byte IV and a
//! 16-byte authentication tag. The master key is process-wide, loaded once at
//! startup from a 64-hex-char secret; decrypted tokens live only transiently
//! in memory for a single outbound call.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, KeyInit, Nonce};
use zeroize::Zeroize;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// AES-256-GCM with the 16-byte IV the at-rest format fixes
type CredentialCipher = AesGcm<Aes256, U16>;

/// Credential vault errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Malformed credential: {0}")]
    Malformed(&'static str),

    #[error("Invalid master key: {0}")]
    InvalidKey(String),

    #[error("Credential authentication failed (tampered or corrupted)")]
    Tampered,

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decrypted credential is not valid UTF-8")]
    NotUtf8,
}

/// Master encryption key (32 bytes for AES-256-GCM)
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; KEY_LEN],
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

impl MasterKey {
    /// Load the master key from a 64-hex-char secret
    pub fn from_hex(hex_key: &str) -> Result<Self, CredentialError> {
        let mut bytes = hex::decode(hex_key.trim())
            .map_err(|_| CredentialError::InvalidKey("not valid hex".into()))?;
        if bytes.len() != KEY_LEN {
            let err = CredentialError::InvalidKey(format!(
                "wrong length: {} bytes (expected {KEY_LEN})",
                bytes.len()
            ));
            bytes.zeroize();
            return Err(err);
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }

    /// Encrypt plaintext → `ivHex:authTagHex:cipherHex`
    ///
    /// A fresh random 16-byte IV is drawn per call.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let cipher =
            CredentialCipher::new_from_slice(&self.key).map_err(|_| CredentialError::Encrypt)?;

        let mut iv = [0u8; IV_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut iv);
        let nonce = Nonce::<U16>::from_slice(&iv);

        // aes-gcm appends the tag to the ciphertext; split it back out for
        // the colon-separated at-rest format.
        let mut sealed = cipher
            .encrypt(nonce, Payload::from(plaintext.as_bytes()))
            .map_err(|_| CredentialError::Encrypt)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(sealed)
        ))
    }

    /// Decrypt `ivHex:authTagHex:cipherHex` → plaintext
    ///
    /// Fails with a [`CredentialError`] when the input does not split into
    /// exactly three colon-separated hex fields, when the IV or tag has the
    /// wrong length, or when the authentication tag does not verify. Never
    /// returns corrupted plaintext.
    pub fn decrypt(&self, stored: &str) -> Result<String, CredentialError> {
        let parts: Vec<&str> = stored.split(':').collect();
        if parts.len() != 3 {
            return Err(CredentialError::Malformed(
                "expected iv:authTag:cipher (3 colon-separated fields)",
            ));
        }

        let iv = hex::decode(parts[0]).map_err(|_| CredentialError::Malformed("IV is not hex"))?;
        let tag =
            hex::decode(parts[1]).map_err(|_| CredentialError::Malformed("auth tag is not hex"))?;
        let ciphertext = hex::decode(parts[2])
            .map_err(|_| CredentialError::Malformed("ciphertext is not hex"))?;

        if iv.len() != IV_LEN {
            return Err(CredentialError::Malformed("IV must be 16 bytes"));
        }
        if tag.len() != TAG_LEN {
            return Err(CredentialError::Malformed("auth tag must be 16 bytes"));
        }

        let cipher = CredentialCipher::new_from_slice(&self.key)
            .map_err(|_| CredentialError::InvalidKey("wrong length".into()))?;
        let nonce = Nonce::<U16>::from_slice(&iv);

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plain = cipher
            .decrypt(nonce, Payload::from(sealed.as_slice()))
            .map_err(|_| CredentialError::Tampered)?;

        String::from_utf8(plain).map_err(|e| {
            e.into_bytes().zeroize();
            CredentialError::NotUtf8
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> MasterKey {
        MasterKey::from_hex(&"ab".repeat(32)).unwrap()
    }

    #[test]
    fn roundtrip() {
        let key = test_key();
        for plaintext in ["", "x", "APP_USR-1234567890-access-token", "emoji 🎽"] {
            let stored = key.encrypt(plaintext).unwrap();
            assert_eq!(key.decrypt(&stored).unwrap(), plaintext);
        }
    }

    #[test]
    fn fresh_iv_per_call() {
        let key = test_key();
        let a = key.encrypt("same input").unwrap();
        let b = key.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn stored_format_is_three_hex_fields() {
        let key = test_key();
        let stored = key.encrypt("token").unwrap();
        let parts: Vec<&str> = stored.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(hex::decode(parts[0]).unwrap().len(), 16);
        assert_eq!(hex::decode(parts[1]).unwrap().len(), 16);
    }

    #[test]
    fn bit_flip_anywhere_fails_closed() {
        let key = test_key();
        let stored = key.encrypt("sensitive-token").unwrap();

        // Flip one bit in every hex nibble position of every segment; decrypt
        // must fail, never return corrupted plaintext.
        for (i, c) in stored.char_indices() {
            if c == ':' {
                continue;
            }
            let flipped = {
                let orig = u8::from_str_radix(&c.to_string(), 16).unwrap();
                format!("{:x}", orig ^ 1)
            };
            let mut tampered = stored.clone();
            tampered.replace_range(i..i + 1, &flipped);
            assert!(key.decrypt(&tampered).is_err(), "position {i} accepted");
        }
    }

    #[test]
    fn rejects_wrong_field_count() {
        let key = test_key();
        assert_eq!(
            key.decrypt("aabb:ccdd").unwrap_err(),
            CredentialError::Malformed("expected iv:authTag:cipher (3 colon-separated fields)")
        );
        assert!(key.decrypt("a:b:c:d").is_err());
    }

    #[test]
    fn rejects_non_hex_and_bad_lengths() {
        let key = test_key();
        let iv = "00".repeat(16);
        let tag = "00".repeat(16);

        assert!(matches!(
            key.decrypt(&format!("zz:{tag}:aabb")),
            Err(CredentialError::Malformed(_))
        ));
        // 12-byte IV is rejected even though it is valid hex
        assert!(matches!(
            key.decrypt(&format!("{}:{tag}:aabb", "00".repeat(12))),
            Err(CredentialError::Malformed("IV must be 16 bytes"))
        ));
        assert!(matches!(
            key.decrypt(&format!("{iv}:{}:aabb", "00".repeat(8))),
            Err(CredentialError::Malformed("auth tag must be 16 bytes"))
        ));
    }

    #[test]
    fn rejects_bad_master_key() {
        assert!(MasterKey::from_hex("not hex at all").is_err());
        assert!(MasterKey::from_hex(&"ab".repeat(16)).is_err()); // 16 bytes
        assert!(MasterKey::from_hex(&"ab".repeat(33)).is_err()); // 33 bytes
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let stored = test_key().encrypt("token").unwrap();
        let other = MasterKey::from_hex(&"cd".repeat(32)).unwrap();
        assert_eq!(other.decrypt(&stored).unwrap_err(), CredentialError::Tampered);
    }
}
