// Keyhost Engine — Crypto-at-Rest
//
// Password-based authenticated encryption for custody secrets (mnemonics,
// private keys).
//
//   key        = PBKDF2-HMAC-SHA256(password, salt, 100_000 iterations) → 32 bytes
//   ciphertext = base64(nonce (12) || AES-256-GCM(key, nonce, plaintext) || tag (16))
//   salt       = base64(32 random bytes)
//
// Every call draws a fresh salt and a fresh nonce, so encrypting the same
// secret twice never yields the same envelope. Decryption failures never say
// whether the password or the ciphertext was at fault.
//
// Key derivation is intentionally slow. Async callers should go through
// `tokio::task::spawn_blocking` (see vault/store.rs).

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hmac::Hmac;
use rand::Rng;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::atoms::constants::{GCM_TAG_LEN, KEY_LEN, NONCE_LEN, PBKDF2_ITERATIONS, SALT_LEN};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::EncryptedData;

// ── Key derivation ─────────────────────────────────────────────────────────

fn derive_key(password: &[u8], salt: &[u8]) -> EngineResult<Zeroizing<[u8; KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, PBKDF2_ITERATIONS, &mut key[..])
        .map_err(|e| EngineError::Internal(format!("PBKDF2 failed: {}", e)))?;
    Ok(key)
}

fn decode_field(name: &str, value: &str) -> EngineResult<Vec<u8>> {
    if value.is_empty() {
        return Err(EngineError::InvalidInput(format!("{} is empty", name)));
    }
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, value)
        .map_err(|_| EngineError::InvalidInput(format!("{} is not valid base64", name)))
}

// ── Encrypt / Decrypt ──────────────────────────────────────────────────────

/// Encrypt `plaintext` under `password`.
pub fn encrypt_with_password(plaintext: &str, password: &str) -> EngineResult<EncryptedData> {
    if plaintext.is_empty() || password.is_empty() {
        return Err(EngineError::EmptyInput);
    }

    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill(&mut salt[..]);
    rng.fill(&mut nonce_bytes[..]);

    let key = derive_key(password.as_bytes(), &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|_| EngineError::Internal("AES key must be 32 bytes".into()))?;

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|e| EngineError::Internal(format!("AES-256-GCM encryption failed: {}", e)))?;

    // Pack: nonce (12) || ciphertext+tag
    let mut packed = Vec::with_capacity(NONCE_LEN + sealed.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(&sealed);

    Ok(EncryptedData {
        ciphertext: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &packed),
        salt: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, salt),
    })
}

/// Decrypt an envelope produced by [`encrypt_with_password`].
pub fn decrypt_with_password(envelope: Option<&EncryptedData>, password: &str) -> EngineResult<String> {
    let envelope = envelope.ok_or_else(|| EngineError::InvalidInput("envelope is missing".into()))?;
    let packed = decode_field("ciphertext", &envelope.ciphertext)?;
    let salt = decode_field("salt", &envelope.salt)?;

    if password.is_empty() {
        return Err(EngineError::EmptyInput);
    }
    if packed.len() < NONCE_LEN + GCM_TAG_LEN {
        return Err(EngineError::InvalidInput("ciphertext too short".into()));
    }

    let (nonce_bytes, sealed) = packed.split_at(NONCE_LEN);
    let key = derive_key(password.as_bytes(), &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|_| EngineError::Internal("AES key must be 32 bytes".into()))?;

    let plain = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| EngineError::AuthenticationFailed)?,
    );

    // A valid tag over non-UTF-8 bytes means the envelope was not ours.
    String::from_utf8(plain.to_vec()).map_err(|_| EngineError::AuthenticationFailed)
}

// ── Tests ──────────────────────────────────────────────────────────────────
