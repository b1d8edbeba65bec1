//! Route state store: the routes last applied for each resource

use crate::{ResourceIdentity, Result, RouteSet};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage for the reconciler's view of which routes exist in the kernel
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Routes recorded for a resource
    async fn get(&self, id: &ResourceIdentity) -> Result<Option<RouteSet>>;

    /// Replace the routes recorded for a resource
    async fn put(&self, id: ResourceIdentity, routes: RouteSet) -> Result<()>;

    /// Forget a resource, returning what was recorded for it
    async fn delete(&self, id: &ResourceIdentity) -> Result<Option<RouteSet>>;

    /// Every recorded resource and its routes
    async fn snapshot(&self) -> Result<Vec<(ResourceIdentity, RouteSet)>>;
}

/// RouteStore kept in process memory; empty on every start
pub struct InMemoryRouteStore {
    routes: Arc<RwLock<HashMap<ResourceIdentity, RouteSet>>>,
}

impl InMemoryRouteStore {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryRouteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn get(&self, id: &ResourceIdentity) -> Result<Option<RouteSet>> {
        let routes = self.routes.read().await;
        Ok(routes.get(id).cloned())
    }

    async fn put(&self, id: ResourceIdentity, routes: RouteSet) -> Result<()> {
        debug!("Recording {} routes for {}", routes.len(), id);
        self.routes.write().await.insert(id, routes);
        Ok(())
    }

    async fn delete(&self, id: &ResourceIdentity) -> Result<Option<RouteSet>> {
        let removed = self.routes.write().await.remove(id);
        if removed.is_some() {
            debug!("Forgot routes for {}", id);
        }
        Ok(removed)
    }

    async fn snapshot(&self) -> Result<Vec<(ResourceIdentity, RouteSet)>> {
        let routes = self.routes.read().await;
        let mut entries: Vec<_> = routes
            .iter()
            .map(|(id, set)| (id.clone(), set.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GatewayBinding, ResolvedRoute};
    use std::net::Ipv4Addr;

    fn route(vip: [u8; 4]) -> ResolvedRoute {
        let binding = GatewayBinding {
            gateway_namespace: "ns1".to_string(),
            vip: Ipv4Addr::from(vip),
        };
        ResolvedRoute::new(&binding, Ipv4Addr::new(10, 0, 0, 1))
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = InMemoryRouteStore::new();
        let id = ResourceIdentity::new("ns", "td1");

        store
            .put(id.clone(), [route([1, 1, 1, 1])].into_iter().collect())
            .await
            .unwrap();
        store
            .put(id.clone(), [route([2, 2, 2, 2])].into_iter().collect())
            .await
            .unwrap();

        let routes = store.get(&id).await.unwrap().unwrap();
        assert_eq!(routes.len(), 1);
        assert!(routes.contains(&route([2, 2, 2, 2])));
    }

    #[tokio::test]
    async fn test_delete_returns_removed() {
        let store = InMemoryRouteStore::new();
        let id = ResourceIdentity::new("ns", "td1");

        assert!(store.delete(&id).await.unwrap().is_none());
        store
            .put(id.clone(), [route([1, 1, 1, 1])].into_iter().collect())
            .await
            .unwrap();

        let removed = store.delete(&id).await.unwrap().unwrap();
        assert_eq!(removed.len(), 1);
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted() {
        let store = InMemoryRouteStore::new();
        store
            .put(ResourceIdentity::new("ns", "b"), RouteSet::new())
            .await
            .unwrap();
        store
            .put(ResourceIdentity::new("ns", "a"), RouteSet::new())
            .await
            .unwrap();

        let ids: Vec<_> = store
            .snapshot()
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id.name)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
