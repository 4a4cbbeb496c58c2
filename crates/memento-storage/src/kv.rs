//! Key-value store contract (spec §4.1, §4.9). Backs the session manager's
//! active-session state, TTL expiry, and pub/sub event fan-out.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use memento_types::Result;
use tokio::sync::broadcast;

use crate::health::HealthStatus;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn del(&self, key: &str) -> Result<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Sorted-set insert/update, used for session-activity ordering.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Returns a receiver that yields payloads published to `channel`
    /// after subscription. Messages published before subscribing are lost,
    /// matching Redis pub/sub semantics.
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>>;

    async fn health_check(&self) -> Result<HealthStatus>;
}

struct Entry {
    value: String,
    expires_at: Option<std::time::Instant>,
}

#[derive(Default)]
struct ZSet {
    scores: HashMap<String, f64>,
}

impl ZSet {
    fn sorted_members(&self) -> Vec<(String, f64)> {
        let mut members: Vec<_> = self.scores.iter().map(|(k, v)| (k.clone(), *v)).collect();
        members.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        members
    }
}

/// In-process fake used by default builds and unit tests.
pub struct InMemoryKvStore {
    entries: parking_lot::RwLock<HashMap<String, Entry>>,
    zsets: parking_lot::RwLock<HashMap<String, ZSet>>,
    channels: parking_lot::Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self {
            entries: parking_lot::RwLock::new(HashMap::new()),
            zsets: parking_lot::RwLock::new(HashMap::new()),
            channels: parking_lot::Mutex::new(HashMap::new()),
        }
    }
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        match entry.expires_at {
            Some(deadline) => deadline > std::time::Instant::now(),
            None => true,
        }
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| Self::is_live(e))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|d| std::time::Instant::now() + d);
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(std::time::Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut zsets = self.zsets.write();
        zsets
            .entry(key.to_string())
            .or_default()
            .scores
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let zsets = self.zsets.read();
        let Some(zset) = zsets.get(key) else {
            return Ok(Vec::new());
        };
        let members = zset.sorted_members();
        let len = members.len() as isize;
        let normalize = |i: isize| -> usize {
            let idx = if i < 0 { (len + i).max(0) } else { i.min(len) };
            idx as usize
        };
        let start_idx = normalize(start);
        let stop_idx = (normalize(stop) + 1).min(members.len());
        if start_idx >= stop_idx {
            return Ok(Vec::new());
        }
        Ok(members[start_idx..stop_idx]
            .iter()
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let channels = self.channels.lock();
        if let Some(sender) = channels.get(channel) {
            // No subscribers is not an error; matches Redis PUBLISH semantics.
            let _ = sender.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>> {
        let mut channels = self.channels.lock();
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(256).0);
        Ok(sender.subscribe())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}

/// Production adapter over Redis, grounded on the connection-manager
/// pattern used for shared async clients that survive reconnects.
#[cfg(feature = "redis-backend")]
pub struct RedisKvStore {
    manager: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis-backend")]
impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[cfg(feature = "redis-backend")]
#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.get(key)
            .await
            .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        match ttl {
            Some(d) => conn
                .set_ex::<_, _, ()>(key, value, d.as_secs().max(1))
                .await
                .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string())),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string())),
        }
    }

    async fn del(&self, key: &str) -> Result<bool> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.expire(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string()))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string()))
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.zrange(key, start as isize, stop as isize)
            .await
            .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string()))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|e| memento_types::MementoError::StoreUnavailable(e.to_string()))
    }

    async fn subscribe(&self, _channel: &str) -> Result<broadcast::Receiver<String>> {
        // Redis pub/sub requires a dedicated connection outside the
        // connection-manager pool; the session manager drives this via
        // its own PubSub client rather than through this trait method.
        Err(memento_types::MementoError::Internal(
            "RedisKvStore::subscribe is not supported; use a dedicated PubSub connection"
                .to_string(),
        ))
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        match conn.get::<_, Option<String>>("__memento_health__").await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(_) => Ok(HealthStatus::Unavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_round_trips() {
        let store = InMemoryKvStore::new();
        store.set("a", "1", None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let store = InMemoryKvStore::new();
        store
            .set("a", "1", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zrange_returns_members_in_score_order() {
        let store = InMemoryKvStore::new();
        store.zadd("sessions", "c", 3.0).await.unwrap();
        store.zadd("sessions", "a", 1.0).await.unwrap();
        store.zadd("sessions", "b", 2.0).await.unwrap();
        let members = store.zrange("sessions", 0, -1).await.unwrap();
        assert_eq!(members, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let store = InMemoryKvStore::new();
        let mut rx = store.subscribe("session.events").await.unwrap();
        store.publish("session.events", "hello").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }
}
