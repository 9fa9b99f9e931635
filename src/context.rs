use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::db::db_pool::ConnectionPool;
use crate::models::SchemaMap;

/// Process-wide state a request works against: the schema snapshot used for
/// prompts and the pool queries run on.
#[derive(Clone, Default)]
pub struct RuntimeContext {
    pub schema: Arc<SchemaMap>,
    /// `None` while no database is configured
    pub pool: Option<Arc<dyn ConnectionPool>>,
}

impl RuntimeContext {
    pub fn new(schema: SchemaMap, pool: Option<Arc<dyn ConnectionPool>>) -> Self {
        Self {
            schema: Arc::new(schema),
            pool,
        }
    }
}

/// Hot-swappable holder for the current [`RuntimeContext`].
///
/// Requests take a snapshot up front; a swap only affects later snapshots.
#[derive(Default)]
pub struct ContextHandle {
    current: RwLock<Arc<RuntimeContext>>,
}

impl ContextHandle {
    pub fn new(context: RuntimeContext) -> Self {
        Self {
            current: RwLock::new(Arc::new(context)),
        }
    }

    pub async fn snapshot(&self) -> Arc<RuntimeContext> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn replace(&self, context: RuntimeContext) {
        *self.current.write().await = Arc::new(context);
        info!("Runtime context replaced");
    }

    /// Swaps in a new schema while keeping the current pool.
    pub async fn replace_schema(&self, schema: SchemaMap) {
        let mut current = self.current.write().await;
        let next = RuntimeContext {
            schema: Arc::new(schema),
            pool: current.pool.clone(),
        };
        *current = Arc::new(next);
        info!("Schema map replaced ({} tables)", current.schema.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::executor::testing::{Behavior, FakePool};
    use crate::models::TableSchema;

    fn schema(name: &str) -> SchemaMap {
        SchemaMap::new(vec![TableSchema {
            name: name.to_string(),
            columns: vec!["id".to_string()],
            description: String::new(),
        }])
    }

    #[tokio::test]
    async fn test_snapshot_survives_replacement() {
        let handle = ContextHandle::new(RuntimeContext::new(schema("before"), None));
        let snapshot = handle.snapshot().await;

        handle.replace_schema(schema("after")).await;

        assert!(snapshot.schema.table("before").is_some());
        let fresh = handle.snapshot().await;
        assert!(fresh.schema.table("after").is_some());
        assert!(fresh.pool.is_none());
    }

    #[tokio::test]
    async fn test_replace_swaps_pool_for_new_snapshots_only() {
        let first: Arc<dyn ConnectionPool> = FakePool::new(Behavior::Rows(Vec::new()));
        let second: Arc<dyn ConnectionPool> = FakePool::new(Behavior::Rows(Vec::new()));
        let handle = ContextHandle::new(RuntimeContext::new(schema("before"), Some(first.clone())));
        let in_flight = handle.snapshot().await;

        handle
            .replace(RuntimeContext::new(schema("after"), Some(second.clone())))
            .await;

        let old_pool = in_flight.pool.as_ref().unwrap();
        assert!(Arc::ptr_eq(old_pool, &first));
        assert!(in_flight.schema.table("before").is_some());

        let fresh = handle.snapshot().await;
        assert!(Arc::ptr_eq(fresh.pool.as_ref().unwrap(), &second));
        assert!(fresh.schema.table("after").is_some());
        assert!(fresh.schema.table("before").is_none());
    }
}
