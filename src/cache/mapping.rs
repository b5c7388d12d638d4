//! # 路由映射缓存
//!
//! 位于集群存储之前的进程内缓存：
//! - 读穿透：未命中时读取完整映射并回填
//! - 写穿透：只有存储写入成功后才修改本地缓存
//!
//! 锁只保护内存表，任何 `.await` 期间都不持有。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::TenantIdentity;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::store::{ClusterStore, RoutingRecord, StoreError};
use crate::{ldebug, linfo, transport_error};

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<String, String>,
    /// 是否已装载过完整映射
    complete: bool,
    /// 每次本地修改递增
    generation: u64,
}

impl Inner {
    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// 主机名 -> 后端 URL 的缓存
pub struct MappingCache {
    store: Arc<dyn ClusterStore>,
    tenant: Arc<TenantIdentity>,
    inner: Mutex<Inner>,
}

impl MappingCache {
    /// 创建空缓存
    pub fn new(store: Arc<dyn ClusterStore>, tenant: Arc<TenantIdentity>) -> Self {
        Self {
            store,
            tenant,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// 租户身份
    #[must_use]
    pub fn tenant(&self) -> &TenantIdentity {
        &self.tenant
    }

    /// 解析主机对应的后端 URL
    pub async fn lookup(&self, host: &str) -> Result<String> {
        let generation = {
            let inner = self.inner.lock();
            if let Some(target) = inner.map.get(host) {
                return Ok(target.clone());
            }
            inner.generation
        };

        ldebug!("system", LogStage::Cache, LogComponent::Cache, "lookup_miss", "缓存未命中，读取存储", host = host);

        let mapping = self.pull().await?;
        let Some(target) = mapping.get(host).cloned() else {
            return Err(GatewayError::not_found(host));
        };

        let mut inner = self.inner.lock();
        // 读取期间发生过本地修改时不回填，避免旧数据覆盖新的删除
        if inner.generation == generation {
            inner.map.insert(host.to_string(), target.clone());
        }
        Ok(target)
    }

    /// 完整映射快照
    ///
    /// 已完整装载时直接返回缓存，否则从存储读取并整体装载。
    pub async fn lookup_all(&self) -> Result<HashMap<String, String>> {
        let generation = {
            let inner = self.inner.lock();
            if inner.complete {
                return Ok(inner.map.clone());
            }
            inner.generation
        };

        let mapping = self.pull().await?;

        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.map.clone_from(&mapping);
            inner.complete = true;
        }
        Ok(mapping)
    }

    /// 写入（无条件覆盖）
    pub fn upsert(&self, host: &str, target: &str) {
        let mut inner = self.inner.lock();
        inner.map.insert(host.to_string(), target.to_string());
        inner.bump();
    }

    /// 删除单个主机
    pub fn remove(&self, host: &str) {
        let mut inner = self.inner.lock();
        inner.map.remove(host);
        inner.bump();
    }

    /// 清空缓存
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.complete = false;
        inner.bump();
    }

    /// 仅读取缓存，不访问存储
    #[must_use]
    pub fn peek(&self, host: &str) -> Option<String> {
        self.inner.lock().map.get(host).cloned()
    }

    /// 缓存条目数
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// 缓存是否为空
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    /// 写入存储，成功后更新缓存
    pub async fn write_through(&self, record: &RoutingRecord) -> Result<()> {
        self.store.put(&self.tenant, record).await?;
        self.upsert(&record.from, &record.to);

        linfo!(
            "system",
            LogStage::Cache,
            LogComponent::Cache,
            "write_through",
            "路由记录已写入",
            from = record.from,
            to = record.to
        );
        Ok(())
    }

    /// 从存储删除，成功后移除缓存
    pub async fn delete_through(&self, host: &str) -> Result<()> {
        self.store.delete(&self.tenant, host).await?;
        self.remove(host);

        linfo!("system", LogStage::Cache, LogComponent::Cache, "delete_through", "路由记录已删除", host = host);
        Ok(())
    }

    /// 预加载完整映射，返回条目数
    pub async fn warm(&self) -> Result<usize> {
        let count = self.lookup_all().await?.len();
        linfo!("system", LogStage::Startup, LogComponent::Cache, "cache_warmed", "映射缓存已预加载", entries = count);
        Ok(count)
    }

    async fn pull(&self) -> Result<HashMap<String, String>> {
        match self.store.get_all(&self.tenant).await {
            Ok(mapping) => Ok(mapping),
            Err(StoreError::NotFound) => Ok(HashMap::new()),
            Err(StoreError::Transport(message)) => Err(transport_error!(message)),
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn tenant() -> Arc<TenantIdentity> {
        Arc::new(TenantIdentity::new("shop", "shop", "secret"))
    }

    fn record(from: &str, to: &str) -> RoutingRecord {
        RoutingRecord {
            from: from.to_string(),
            to: to.to_string(),
            cert: b"cert".to_vec(),
            key: b"key".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_read_through_populates() {
        let tenant = tenant();
        let store = Arc::new(MemoryStore::new("prx"));
        store.seed_mapping(&tenant, "a.example.com", "http://a");
        let cache = MappingCache::new(store.clone(), tenant);

        assert_eq!(cache.peek("a.example.com"), None);
        assert_eq!(cache.lookup("a.example.com").await.unwrap(), "http://a");
        assert_eq!(cache.peek("a.example.com").as_deref(), Some("http://a"));

        // 命中后不再访问存储
        let calls = store.calls();
        cache.lookup("a.example.com").await.unwrap();
        assert_eq!(store.calls(), calls);
    }

    #[tokio::test]
    async fn test_missing_mapping_is_not_found() {
        let cache = MappingCache::new(Arc::new(MemoryStore::new("prx")), tenant());
        let err = cache.lookup("nope.example.com").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
        assert!(cache.lookup_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_transport() {
        let store = Arc::new(MemoryStore::new("prx"));
        store.fail_next(1);
        let cache = MappingCache::new(store, tenant());

        let err = cache.lookup("a.example.com").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_write_through_only_on_success() {
        let store = Arc::new(MemoryStore::new("prx"));
        let cache = MappingCache::new(store.clone(), tenant());

        store.fail_next(1);
        assert!(cache.write_through(&record("a.example.com", "http://a")).await.is_err());
        assert!(cache.is_empty());

        cache.write_through(&record("a.example.com", "http://a")).await.unwrap();
        assert_eq!(cache.peek("a.example.com").as_deref(), Some("http://a"));
    }

    #[tokio::test]
    async fn test_delete_through_only_on_success() {
        let tenant = tenant();
        let store = Arc::new(MemoryStore::new("prx"));
        let cache = MappingCache::new(store.clone(), tenant.clone());
        cache.write_through(&record("a.example.com", "http://a")).await.unwrap();

        store.fail_next(1);
        assert!(cache.delete_through("a.example.com").await.is_err());
        assert_eq!(cache.len(), 1);

        cache.delete_through("a.example.com").await.unwrap();
        assert!(cache.is_empty());
        assert!(store.get_all(&tenant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_all_uses_snapshot_once_complete() {
        let tenant = tenant();
        let store = Arc::new(MemoryStore::new("prx"));
        store.seed_mapping(&tenant, "a.example.com", "http://a");
        let cache = MappingCache::new(store.clone(), tenant.clone());

        assert_eq!(cache.warm().await.unwrap(), 1);
        let calls = store.calls();

        // 存储被外部修改，缓存快照保持不变
        store.seed_mapping(&tenant, "b.example.com", "http://b");
        assert_eq!(cache.lookup_all().await.unwrap().len(), 1);
        assert_eq!(store.calls(), calls);

        cache.clear();
        assert_eq!(cache.lookup_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let cache = MappingCache::new(Arc::new(MemoryStore::new("prx")), tenant());
        cache.upsert("a.example.com", "http://a");
        cache.upsert("a.example.com", "http://b");
        assert_eq!(cache.lookup("a.example.com").await.unwrap(), "http://b");
    }

    #[tokio::test]
    async fn test_stale_read_does_not_resurrect_deleted_host() {
        let tenant = tenant();
        let store = Arc::new(MemoryStore::new("prx").with_latency(Duration::from_millis(50)));
        let cache = Arc::new(MappingCache::new(store.clone(), tenant.clone()));
        store.seed_mapping(&tenant, "a.example.com", "http://a");

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.lookup("a.example.com").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        // 读取进行中时发生一次本地删除
        cache.remove("a.example.com");

        assert_eq!(reader.await.unwrap().unwrap(), "http://a");
        assert_eq!(cache.peek("a.example.com"), None);
    }
}
