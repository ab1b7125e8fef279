use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use sha2::Sha256;

use crate::constants::{NONCE_SIZE, ROOM_KDF_ITERATIONS, ROOM_KDF_SALT_PREFIX, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt and encode as a base64url token, the form used inside envelopes.
pub fn encrypt_token(key: &SymmetricKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    encrypt(key, plaintext).map(|bytes| URL_SAFE_NO_PAD.encode(bytes))
}

/// Inverse of [`encrypt_token`]. A token that is not valid base64 is treated
/// the same as one that fails authentication.
pub fn decrypt_token(key: &SymmetricKey, token: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| CryptoError::DecryptionFailed)?;
    decrypt(key, &bytes)
}

/// PBKDF2-HMAC-SHA256 over the passphrase, salted with the room name.
/// Deterministic for a given `(room, passphrase)`.
pub fn derive_room_key(room: &str, passphrase: &str) -> SymmetricKey {
    let mut salt = Vec::with_capacity(ROOM_KDF_SALT_PREFIX.len() + room.len());
    salt.extend_from_slice(ROOM_KDF_SALT_PREFIX.as_bytes());
    salt.extend_from_slice(room.as_bytes());

    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), &salt, ROOM_KDF_ITERATIONS, &mut key);
    key
}

pub fn key_from_slice(bytes: &[u8]) -> Result<SymmetricKey, CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength)
}
