use async_trait::async_trait;

use crate::db::error::DbResult;

/// Account state consulted during refresh-token rotation.
#[async_trait]
pub trait AccountStatusRepo: Send + Sync {
    /// Whether the user may still obtain new tokens. Unknown users are inactive.
    async fn is_active(&self, user_id: &str) -> DbResult<bool>;
}
