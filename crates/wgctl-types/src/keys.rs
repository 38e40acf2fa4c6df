//! WireGuard key types: public, private, and preshared keys.
//!
//! WireGuard uses Curve25519 for key exchange; all three key kinds are
//! 32 raw bytes, exchanged and stored as standard base64.

use crate::error::TypeError;
use base64::Engine;
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// WireGuard key size in bytes (256-bit Curve25519 keys).
pub const KEY_SIZE: usize = 32;

fn encode_b64(bytes: &[u8; KEY_SIZE]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn decode_b64(s: &str) -> Result<[u8; KEY_SIZE], TypeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s.trim())
        .map_err(|e| TypeError::InvalidBase64(e.to_string()))?;
    if bytes.len() != KEY_SIZE {
        return Err(TypeError::InvalidKeyLength(bytes.len()));
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// A WireGuard public key (Curve25519, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from a byte array.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the public key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as standard base64 (44 characters with padding).
    #[must_use]
    pub fn to_base64(&self) -> String {
        encode_b64(&self.0)
    }

    /// Decodes a public key from its base64 representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or the wrong length.
    pub fn from_base64(s: &str) -> Result<Self, TypeError> {
        Ok(Self(decode_b64(s)?))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        write!(f, "PublicKey({}...)", &b64[..8.min(b64.len())])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

impl From<X25519PublicKey> for PublicKey {
    fn from(key: X25519PublicKey) -> Self {
        Self::from_bytes_array(*key.as_bytes())
    }
}

/// A WireGuard private key (Curve25519, 32 bytes). Never logged or displayed.
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Generates a new random private key.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self(secret.to_bytes())
    }

    /// Creates a private key from a byte array.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the private key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Derives the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        PublicKey::from(X25519PublicKey::from(&secret))
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        encode_b64(&self.0)
    }

    /// Decodes a private key from its base64 representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or the wrong length.
    pub fn from_base64(s: &str) -> Result<Self, TypeError> {
        Ok(Self(decode_b64(s)?))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

/// A WireGuard preshared key (optional, 32 bytes, never logged or displayed).
#[derive(Clone)]
pub struct PresharedKey([u8; KEY_SIZE]);

impl PresharedKey {
    /// Generates a new random preshared key.
    #[must_use]
    pub fn generate() -> Self {
        use rand_core::RngCore;
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Creates a preshared key from a byte array.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the preshared key.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        encode_b64(&self.0)
    }

    /// Decodes a preshared key from its base64 representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or the wrong length.
    pub fn from_base64(s: &str) -> Result<Self, TypeError> {
        Ok(Self(decode_b64(s)?))
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedKey").field("key", &"[REDACTED]").finish()
    }
}

impl PartialEq for PresharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PresharedKey {}

/// Generates a new WireGuard keypair.
#[must_use]
pub fn generate_keypair() -> (PrivateKey, PublicKey) {
    let private = PrivateKey::generate();
    let public = private.public_key();
    (private, public)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_to_public_key_is_deterministic() {
        let private = PrivateKey::generate();
        assert_eq!(private.public_key(), private.public_key());
    }

    #[test]
    fn different_private_keys_produce_different_public_keys() {
        let a = PrivateKey::generate();
        let b = PrivateKey::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let public = PrivateKey::generate().public_key();
        let decoded = PublicKey::from_base64(&public.to_base64()).expect("decode failed");
        assert_eq!(public, decoded);
    }

    #[test]
    fn public_key_base64_is_44_chars() {
        let public = PrivateKey::generate().public_key();
        assert_eq!(public.to_base64().len(), 44);
    }

    #[test]
    fn private_key_debug_redacts() {
        let private = PrivateKey::generate();
        assert!(format!("{private:?}").contains("REDACTED"));
    }

    #[test]
    fn preshared_key_debug_redacts() {
        let psk = PresharedKey::generate();
        assert!(format!("{psk:?}").contains("REDACTED"));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(PublicKey::from_base64(&short).is_err());
    }

    #[test]
    fn public_key_serde_roundtrip() {
        let public = PrivateKey::generate().public_key();
        let json = serde_json::to_string(&public).unwrap();
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(public, back);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn public_key_base64_roundtrip_prop(bytes in prop::array::uniform32(any::<u8>())) {
                let public = PublicKey::from_bytes_array(bytes);
                let decoded = PublicKey::from_base64(&public.to_base64());
                prop_assert!(decoded.is_ok());
                prop_assert_eq!(public, decoded.unwrap());
            }
        }
    }
}
