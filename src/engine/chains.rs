// Keyhost Engine — Chain Families
//
// Format checks and local key handling per chain family. Everything here is
// offline: no RPC, no transaction wire formats.
//
//   EVM    — secp256k1 keys, addresses are 0x + 40 hex with EIP-55 checksum,
//            secrets stored as 0x-prefixed hex.
//   Solana — ed25519 keys, addresses are base58 of the 32-byte public key,
//            secrets stored as base58 of the 64-byte keypair.

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::SigningKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

impl std::fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Evm => write!(f, "evm"),
            Self::Solana => write!(f, "solana"),
        }
    }
}

// ── Primitives ─────────────────────────────────────────────────────────────

pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    use tiny_keccak::{Hasher, Keccak};
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

/// EIP-55 mixed-case form of a 20-byte address.
pub fn eip55_checksum(addr_bytes: &[u8]) -> String {
    let hex_addr = hex_encode(addr_bytes);
    let hash = keccak256(hex_addr.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in hex_addr.chars().enumerate() {
        let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
        out.push(if nibble >= 8 { c.to_ascii_uppercase() } else { c });
    }
    out
}

fn is_evm_address(addr: &str) -> bool {
    let Some(body) = addr.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }
    let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return true;
    }
    // Mixed case means the sender meant it as a checksum: hold them to it.
    hex_decode(body).is_some_and(|bytes| eip55_checksum(&bytes) == addr)
}

fn is_solana_address(addr: &str) -> bool {
    (32..=44).contains(&addr.len())
        && bs58::decode(addr).into_vec().map(|v| v.len() == 32).unwrap_or(false)
}

// ── Family behavior ────────────────────────────────────────────────────────

impl ChainFamily {
    pub fn validate_address(&self, address: &str) -> bool {
        let address = address.trim();
        match self {
            Self::Evm => is_evm_address(address),
            Self::Solana => is_solana_address(address),
        }
    }

    /// Token contracts / mints share the account address format.
    pub fn validate_token_address(&self, token: &str) -> bool {
        self.validate_address(token)
    }

    /// Fresh random secret in this family's storage encoding.
    pub fn generate_secret(&self) -> Zeroizing<String> {
        match self {
            Self::Evm => {
                let key = k256::ecdsa::SigningKey::random(&mut rand::thread_rng());
                Zeroizing::new(format!("0x{}", hex_encode(&key.to_bytes())))
            }
            Self::Solana => {
                let key = ed25519_dalek::SigningKey::generate(&mut rand::thread_rng());
                let mut keypair = Zeroizing::new([0u8; 64]);
                keypair[..32].copy_from_slice(&key.to_bytes());
                keypair[32..].copy_from_slice(key.verifying_key().as_bytes());
                Zeroizing::new(bs58::encode(&keypair[..]).into_string())
            }
        }
    }

    pub fn derive_address(&self, secret: &SigningKey) -> EngineResult<String> {
        match self {
            Self::Evm => {
                let key = evm_key(secret)?;
                let point = key.verifying_key().to_encoded_point(false);
                let hash = keccak256(&point.as_bytes()[1..]);
                Ok(eip55_checksum(&hash[12..]))
            }
            Self::Solana => {
                let key = solana_key(secret)?;
                Ok(bs58::encode(key.verifying_key().as_bytes()).into_string())
            }
        }
    }

    /// EVM: personal_sign (EIP-191) signature as 0x r||s||v hex.
    /// Solana: detached ed25519 signature, base58.
    pub fn sign_message(&self, secret: &SigningKey, message: &[u8]) -> EngineResult<String> {
        match self {
            Self::Evm => {
                let key = evm_key(secret)?;
                let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
                prefixed.extend_from_slice(message);
                let digest = keccak256(&prefixed);
                let (signature, recovery_id) = key
                    .sign_prehash_recoverable(&digest)
                    .map_err(|e| EngineError::Internal(format!("secp256k1 signing failed: {}", e)))?;
                let mut out = signature.to_bytes().to_vec();
                out.push(27 + recovery_id.to_byte());
                Ok(format!("0x{}", hex_encode(&out)))
            }
            Self::Solana => {
                use ed25519_dalek::Signer;
                let key = solana_key(secret)?;
                Ok(bs58::encode(key.sign(message).to_bytes()).into_string())
            }
        }
    }
}

fn secret_text(secret: &SigningKey) -> EngineResult<&str> {
    std::str::from_utf8(secret.as_bytes())
        .map(str::trim)
        .map_err(|_| EngineError::invalid("secret", "not valid UTF-8"))
}

fn evm_key(secret: &SigningKey) -> EngineResult<k256::ecdsa::SigningKey> {
    let bytes = Zeroizing::new(
        hex_decode(secret_text(secret)?)
            .ok_or_else(|| EngineError::invalid("secret", "expected a hex private key"))?,
    );
    if bytes.len() != 32 {
        return Err(EngineError::invalid("secret", "private key must be 32 bytes"));
    }
    k256::ecdsa::SigningKey::from_slice(&bytes)
        .map_err(|_| EngineError::invalid("secret", "not a valid secp256k1 private key"))
}

fn solana_key(secret: &SigningKey) -> EngineResult<ed25519_dalek::SigningKey> {
    let bytes = Zeroizing::new(
        bs58::decode(secret_text(secret)?)
            .into_vec()
            .map_err(|_| EngineError::invalid("secret", "expected a base58 keypair"))?,
    );
    // 64-byte keypair (secret || public) or a bare 32-byte secret.
    if bytes.len() != 64 && bytes.len() != 32 {
        return Err(EngineError::invalid("secret", "keypair must be 32 or 64 bytes"));
    }
    let mut seed = Zeroizing::new([0u8; 32]);
    seed.copy_from_slice(&bytes[..32]);
    let key = ed25519_dalek::SigningKey::from_bytes(&seed);
    if bytes.len() == 64 && key.verifying_key().as_bytes()[..] != bytes[32..] {
        return Err(EngineError::invalid("secret", "keypair public half does not match"));
    }
    Ok(key)
}
