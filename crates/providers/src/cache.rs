//! Response cache: memoises `create` results by request.
//!
//! Two requests hit the same entry when their serialized form is equal
//! (messages, tools and schema). Cached results come back with
//! `cached: true` and zero usage, since nothing was spent producing them.
//! Streaming requests bypass the cache so chunks still arrive live.
//! The oldest entry is evicted once the cache is full.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use agenx_core::error::ProviderError;
use agenx_core::provider::*;
use agenx_core::CancellationToken;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

/// Entries kept by default.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Default)]
struct Entries {
    results: HashMap<String, CreateResult>,
    // Insertion order, oldest first
    order: VecDeque<String>,
}

/// Wraps a backend and remembers its complete results.
pub struct CachedBackend {
    inner: Arc<dyn ModelBackend>,
    capacity: usize,
    entries: RwLock<Entries>,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn ModelBackend>) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: Arc<dyn ModelBackend>, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Number of cached results.
    pub async fn len(&self) -> usize {
        self.entries.read().await.results.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.results.is_empty()
    }

    fn key(request: &ModelRequest) -> Result<String, ProviderError> {
        // Message ids and timestamps differ between otherwise equal requests
        let messages: Vec<_> = request
            .messages
            .iter()
            .map(|m| (m.role, &m.source, &m.content))
            .collect();
        serde_json::to_string(&(messages, &request.tools, &request.json_schema))
            .map_err(|e| ProviderError::InvalidResponse(format!("Unkeyable request: {e}")))
    }
}

#[async_trait]
impl ModelBackend for CachedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateResult, ProviderError> {
        let key = Self::key(&request)?;

        if let Some(hit) = self.entries.read().await.results.get(&key) {
            debug!(backend = %self.inner.name(), "Cache hit");
            let mut result = hit.clone();
            result.cached = true;
            result.usage = RequestUsage::default();
            return Ok(result);
        }

        let result = self.inner.create(request, cancel).await?;

        let mut entries = self.entries.write().await;
        if entries.results.insert(key.clone(), result.clone()).is_none() {
            entries.order.push_back(key);
        }
        while entries.results.len() > self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.results.remove(&oldest);
            debug!(backend = %self.inner.name(), "Cache full, evicted oldest entry");
        }
        Ok(result)
    }

    async fn create_stream(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelStream, ProviderError> {
        self.inner.create_stream(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenx_core::message::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn create(
            &self,
            request: ModelRequest,
            _cancel: &CancellationToken,
        ) -> Result<CreateResult, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let last = request.messages.last().map(|m| m.text()).unwrap_or_default();
            Ok(CreateResult::text(format!("{last}#{n}")).with_usage(RequestUsage::new(5, 2)))
        }
    }

    fn counting() -> Arc<CountingBackend> {
        Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn identical_requests_hit_the_cache() {
        let inner = counting();
        let cache = CachedBackend::new(inner.clone());
        let cancel = CancellationToken::new();

        let first = cache
            .create(ModelRequest::new(vec![Message::user("user", "hi")]), &cancel)
            .await
            .unwrap();
        // A fresh message with a new id and timestamp is still the same request
        let second = cache
            .create(ModelRequest::new(vec![Message::user("user", "hi")]), &cancel)
            .await
            .unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.content, second.content);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.usage.total(), 0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn different_requests_miss() {
        let inner = counting();
        let cache = CachedBackend::new(inner.clone());
        let cancel = CancellationToken::new();

        cache
            .create(ModelRequest::new(vec![Message::user("user", "a")]), &cancel)
            .await
            .unwrap();
        cache
            .create(ModelRequest::new(vec![Message::user("user", "b")]), &cancel)
            .await
            .unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.name(), "counting");
    }

    #[tokio::test]
    async fn full_cache_evicts_the_oldest_entry() {
        let inner = counting();
        let cache = CachedBackend::with_capacity(inner.clone(), 2);
        let cancel = CancellationToken::new();
        let ask = |text: &str| ModelRequest::new(vec![Message::user("user", text)]);

        cache.create(ask("a"), &cancel).await.unwrap();
        cache.create(ask("b"), &cancel).await.unwrap();
        cache.create(ask("c"), &cancel).await.unwrap();
        assert_eq!(cache.len().await, 2);

        // "c" is still cached, "a" was evicted
        assert!(cache.create(ask("c"), &cancel).await.unwrap().cached);
        assert!(!cache.create(ask("a"), &cancel).await.unwrap().cached);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }
}
