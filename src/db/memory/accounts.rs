use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::{AccountStatusRepo, DbResult};

/// Active flags keyed by user id.
pub struct MemoryAccountRepo {
    active: RwLock<HashMap<String, bool>>,
}

impl MemoryAccountRepo {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_active(&self, user_id: &str, active: bool) {
        let mut accounts = self.active.write().await;
        accounts.insert(user_id.to_string(), active);
    }
}

impl Default for MemoryAccountRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStatusRepo for MemoryAccountRepo {
    async fn is_active(&self, user_id: &str) -> DbResult<bool> {
        let accounts = self.active.read().await;
        Ok(accounts.get(user_id).copied().unwrap_or(false))
    }
}
