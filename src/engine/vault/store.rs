// Keyhost Engine — Wallet Store
//
// One JSON record per wallet under `<data_dir>/wallets/<name>.json`. The
// `secret` field is the only place key material touches disk, and only as an
// encrypted envelope. Writes go through a temp file + rename so a crash never
// leaves a half-written record.

use super::crypto::{decrypt_with_password, encrypt_with_password};
use crate::atoms::constants::WALLETS_DIR;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{EncryptedData, SigningKey};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub name: String,
    pub chain_id: String,
    pub address: String,
    pub secret: EncryptedData,
    pub created_at: DateTime<Utc>,
}

/// Public view of a wallet — never includes the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub name: String,
    pub chain_id: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

impl From<&WalletRecord> for WalletInfo {
    fn from(r: &WalletRecord) -> Self {
        WalletInfo {
            name: r.name.clone(),
            chain_id: r.chain_id.clone(),
            address: r.address.clone(),
            created_at: r.created_at,
        }
    }
}

pub struct WalletStore {
    dir: PathBuf,
}

impl WalletStore {
    /// Open (and create if needed) the wallet directory under `data_dir`.
    pub fn open(data_dir: &Path) -> EngineResult<Self> {
        let dir = data_dir.join(WALLETS_DIR);
        std::fs::create_dir_all(&dir)?;
        Ok(WalletStore { dir })
    }

    fn path_for(&self, name: &str) -> EngineResult<PathBuf> {
        validate_wallet_name(name)?;
        Ok(self.dir.join(format!("{}.json", name)))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Encrypt `secret` under `password` and persist it. Overwrites an
    /// existing wallet of the same name only when `overwrite` is set.
    pub async fn save(
        &self,
        name: &str,
        chain_id: &str,
        address: &str,
        secret: Zeroizing<String>,
        password: Zeroizing<String>,
        overwrite: bool,
    ) -> EngineResult<WalletInfo> {
        let path = self.path_for(name)?;
        if chain_id.trim().is_empty() {
            return Err(EngineError::MissingRequiredField("chain_id".into()));
        }
        if !overwrite && path.exists() {
            return Err(EngineError::invalid("name", format!("wallet '{}' already exists", name)));
        }

        let envelope = tokio::task::spawn_blocking(move || encrypt_with_password(&secret, &password))
            .await
            .map_err(|e| EngineError::Internal(format!("encryption task failed: {}", e)))??;

        let record = WalletRecord {
            name: name.to_string(),
            chain_id: chain_id.to_string(),
            address: address.to_string(),
            secret: envelope,
            created_at: Utc::now(),
        };
        write_record(&path, &record)?;
        info!("[vault] Stored wallet '{}' on {} ({})", name, chain_id, address);
        Ok(WalletInfo::from(&record))
    }

    pub fn load(&self, name: &str) -> EngineResult<WalletRecord> {
        let path = self.path_for(name)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::WalletNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn info(&self, name: &str) -> EngineResult<WalletInfo> {
        self.load(name).map(|r| WalletInfo::from(&r))
    }

    /// All wallets, sorted by name.
    pub fn list(&self) -> EngineResult<Vec<WalletInfo>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<WalletRecord>(&raw) {
                Ok(r) => out.push(WalletInfo::from(&r)),
                Err(e) => log::warn!("[vault] Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Decrypt the wallet secret. The plaintext only lives inside the
    /// returned key, which zeroizes on drop.
    pub async fn unlock(&self, name: &str, password: Zeroizing<String>) -> EngineResult<SigningKey> {
        let record = self.load(name)?;
        let plain = tokio::task::spawn_blocking(move || {
            decrypt_with_password(Some(&record.secret), &password).map(Zeroizing::new)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("decryption task failed: {}", e)))??;
        Ok(SigningKey::new(plain.as_bytes().to_vec()))
    }

    pub fn remove(&self, name: &str) -> EngineResult<()> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(EngineError::WalletNotFound(name.to_string()));
        }
        std::fs::remove_file(path)?;
        info!("[vault] Removed wallet '{}'", name);
        Ok(())
    }
}

/// Names become file names: keep them boring.
fn validate_wallet_name(name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::MissingRequiredField("name".into()));
    }
    if name.len() > 64 || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(EngineError::invalid("name", "use 1-64 characters from [A-Za-z0-9_-]"));
    }
    Ok(())
}

fn write_record(path: &Path, record: &WalletRecord) -> EngineResult<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn z(s: &str) -> Zeroizing<String> {
        Zeroizing::new(s.to_string())
    }

    #[tokio::test]
    async fn test_save_and_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::open(dir.path()).unwrap();
        let info = store
            .save("main", "ethereum", "0xabc", z("deadbeef"), z("pw"), false)
            .await
            .unwrap();
        assert_eq!(info.address, "0xabc");

        let key = store.unlock("main", z("pw")).await.unwrap();
        assert_eq!(key.as_bytes(), b"deadbeef");
    }

    #[tokio::test]
    async fn test_record_has_no_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::open(dir.path()).unwrap();
        store.save("w1", "solana", "Addr", z("super-secret-seed"), z("pw"), false).await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join("wallets/w1.json")).unwrap();
        assert!(!raw.contains("super-secret-seed"));
        assert!(raw.contains("ciphertext"));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::open(dir.path()).unwrap();
        store.save("main", "ethereum", "0xabc", z("k"), z("pw"), false).await.unwrap();
        assert!(matches!(store.unlock("main", z("nope")).await, Err(EngineError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_duplicate_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::open(dir.path()).unwrap();
        store.save("main", "ethereum", "0x1", z("k"), z("pw"), false).await.unwrap();
        assert!(store.save("main", "ethereum", "0x2", z("k"), z("pw"), false).await.is_err());
        store.save("main", "ethereum", "0x2", z("k"), z("pw"), true).await.unwrap();
        assert_eq!(store.info("main").unwrap().address, "0x2");
    }

    #[test]
    fn test_missing_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::open(dir.path()).unwrap();
        assert!(matches!(store.info("ghost"), Err(EngineError::WalletNotFound(_))));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_wallet_name("main-1_a").is_ok());
        assert!(validate_wallet_name("../etc/passwd").is_err());
        assert!(validate_wallet_name("").is_err());
    }
}
