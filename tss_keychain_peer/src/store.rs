use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tss_keychain_sdk::{
    exception::{KeychainError, Outcome},
    keychain::{Keychain, KeychainDescriptor},
    store::KeychainStore,
};
use uuid::Uuid;

/// One JSON file per keychain, named after its id.
pub struct FileKeychainStore {
    dir: PathBuf,
}

impl FileKeychainStore {
    pub async fn open(dir: impl AsRef<Path>) -> Outcome<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| KeychainError::Storage(format!("{}: {err}", dir.display())))?;
        Ok(FileKeychainStore { dir })
    }

    fn path_of(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl KeychainStore for FileKeychainStore {
    async fn add_keychain(&self, descriptor: KeychainDescriptor) -> Outcome<Keychain> {
        let keychain = Keychain::from_descriptor(Uuid::new_v4().to_string(), descriptor);
        let path = self.path_of(&keychain.id);
        let json = serde_json::to_string_pretty(&keychain)?;
        // Renamed into place once fully written.
        let partial = path.with_extension("json.partial");
        tokio::fs::write(&partial, json)
            .await
            .map_err(|err| KeychainError::Storage(format!("{}: {err}", partial.display())))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|err| KeychainError::Storage(format!("{}: {err}", path.display())))?;
        Ok(keychain)
    }

    async fn get_keychain(&self, id: &str) -> Outcome<Option<Keychain>> {
        let path = self.path_of(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(KeychainError::Storage(format!("{}: {err}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tss_keychain_sdk::party::Party;

    #[tokio::test]
    async fn records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeychainStore::open(dir.path()).await.unwrap();
        let mut descriptor = KeychainDescriptor::new(Party::Backup, "ab".repeat(65));
        descriptor.encrypted_prv = Some("{\"v\":1}".to_owned());
        let stored = store.add_keychain(descriptor).await.unwrap();

        let reopened = FileKeychainStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get_keychain(&stored.id).await.unwrap(), Some(stored));
        assert_eq!(reopened.get_keychain("absent").await.unwrap(), None);
    }
}
