// Keyhost Engine — Vault
//
//   crypto — password-based AES-256-GCM envelopes
//   store  — encrypted wallet records on disk

pub mod crypto;
pub mod store;

pub use crypto::{decrypt_with_password, encrypt_with_password};
pub use store::{WalletInfo, WalletRecord, WalletStore};
