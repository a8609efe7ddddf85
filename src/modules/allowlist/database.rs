use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::database::{Database, DbError};

#[derive(Default, Serialize, Deserialize, Clone, Debug)]
pub struct AllowListDatabase {
    pub users: HashSet<u64>,
}

pub type AllowList = Database<AllowListDatabase>;

impl AllowList {
    pub async fn is_authorized(&self, user_id: u64, is_administrator: bool) -> bool {
        is_administrator || self.read(|db| db.users.contains(&user_id)).await
    }

    /// Returns whether the user was newly added. The in-memory set keeps the
    /// change even if writing it out fails.
    pub async fn add(&self, user_id: u64) -> (bool, Option<DbError>) {
        let result = self.apply(|db| db.users.insert(user_id)).await;
        (result.value, result.error)
    }

    pub async fn remove(&self, user_id: u64) -> (bool, Option<DbError>) {
        let result = self.apply(|db| db.users.remove(&user_id)).await;
        (result.value, result.error)
    }

    pub async fn members(&self) -> Vec<u64> {
        let mut users: Vec<u64> = self.read(|db| db.users.iter().copied().collect()).await;
        users.sort_unstable();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &tempfile::TempDir) -> AllowList {
        let path = dir.path().join("allowlist.db");
        AllowList::new(path.to_str().unwrap().to_string()).await.unwrap()
    }

    #[tokio::test]
    async fn administrators_are_always_authorized() {
        let dir = tempfile::tempdir().unwrap();
        let list = open(&dir).await;
        assert!(list.is_authorized(1, true).await);
        assert!(!list.is_authorized(1, false).await);
    }

    #[tokio::test]
    async fn add_and_remove_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let list = open(&dir).await;

        assert!(matches!(list.add(5).await, (true, None)));
        assert!(matches!(list.add(5).await, (false, None)));
        assert!(matches!(list.add(9).await, (true, None)));
        assert!(list.is_authorized(5, false).await);

        let reloaded = open(&dir).await;
        assert_eq!(reloaded.members().await, vec![5, 9]);

        assert!(matches!(reloaded.remove(5).await, (true, None)));
        assert!(matches!(reloaded.remove(5).await, (false, None)));
        assert_eq!(open(&dir).await.members().await, vec![9]);
    }
}
