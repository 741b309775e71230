use crate::{exception::*, keychain::*};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence for keychain records. Each `add_keychain` call is atomic
/// and returns the stored record with its assigned id.
#[async_trait]
pub trait KeychainStore: Send + Sync {
    async fn add_keychain(&self, descriptor: KeychainDescriptor) -> Outcome<Keychain>;

    async fn get_keychain(&self, id: &str) -> Outcome<Option<Keychain>>;
}

#[derive(Debug, Default)]
pub struct InMemoryKeychainStore {
    records: RwLock<HashMap<String, Keychain>>,
}

impl InMemoryKeychainStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl KeychainStore for InMemoryKeychainStore {
    async fn add_keychain(&self, descriptor: KeychainDescriptor) -> Outcome<Keychain> {
        let keychain = Keychain::from_descriptor(Uuid::new_v4().to_string(), descriptor);
        self.records
            .write()
            .await
            .insert(keychain.id.clone(), keychain.clone());
        Ok(keychain)
    }

    async fn get_keychain(&self, id: &str) -> Outcome<Option<Keychain>> {
        Ok(self.records.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::party::Party;

    #[tokio::test]
    async fn assigns_distinct_ids() {
        let store = InMemoryKeychainStore::new();
        let a = store
            .add_keychain(KeychainDescriptor::new(Party::User, "aa".to_owned()))
            .await
            .unwrap();
        let b = store
            .add_keychain(KeychainDescriptor::new(Party::Backup, "aa".to_owned()))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get_keychain(&a.id).await.unwrap(), Some(a));
        assert_eq!(store.get_keychain("missing").await.unwrap(), None);
    }
}
