use anyhow::{anyhow, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, warn};

/// Prefixed key/value + list access over Redis. The connection is treated as
/// unreliable: every operation returns `Result`, a failed command drops the
/// connection, and the next call re-dials. Callers degrade to no-ops on Err;
/// nothing in the pipeline may crash because the cache is away.
pub struct CacheClient {
    url: String,
    prefix: String,
    conn: Option<MultiplexedConnection>,
}

impl CacheClient {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
        let mut client = Self {
            url: url.to_string(),
            prefix: prefix.to_string(),
            conn: None,
        };
        if let Err(err) = client.dial().await {
            warn!(?err, "cache unavailable at startup; continuing degraded");
        }
        Ok(client)
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn dial(&mut self) -> Result<()> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(url = %self.url, "cache connected");
        self.conn = Some(conn);
        Ok(())
    }

    async fn connection(&mut self) -> Result<MultiplexedConnection> {
        if self.conn.is_none() {
            self.dial().await?;
        }
        self.conn
            .clone()
            .ok_or_else(|| anyhow!("cache disconnected"))
    }

    fn drop_conn_on<E: std::fmt::Debug>(&mut self, err: E) -> anyhow::Error {
        self.conn = None;
        anyhow!("cache command failed: {err:?}")
    }

    pub async fn set_with_ttl(&mut self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let full = self.full_key(key);
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(&full, value, ttl_secs)
            .await
            .map_err(|e| self.drop_conn_on(e))
    }

    pub async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let full = self.full_key(key);
        let mut conn = self.connection().await?;
        conn.get(&full).await.map_err(|e| self.drop_conn_on(e))
    }

    pub async fn delete(&mut self, key: &str) -> Result<()> {
        let full = self.full_key(key);
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(&full)
            .await
            .map_err(|e| self.drop_conn_on(e))
    }

    /// Remaining TTL in seconds; -1 for a key without expiry, -2 for a
    /// missing key (Redis semantics).
    pub async fn ttl(&mut self, key: &str) -> Result<i64> {
        let full = self.full_key(key);
        let mut conn = self.connection().await?;
        conn.ttl(&full).await.map_err(|e| self.drop_conn_on(e))
    }

    /// Keys under `prefix + scope`, returned with the client prefix already
    /// stripped so callers see the same names they wrote.
    pub async fn keys_by_prefix(&mut self, scope: &str) -> Result<Vec<String>> {
        let pattern = format!("{}{}*", self.prefix, scope);
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| self.drop_conn_on(e))?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    pub async fn list_push_left(&mut self, key: &str, value: &str) -> Result<()> {
        let full = self.full_key(key);
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(&full, value)
            .await
            .map_err(|e| self.drop_conn_on(e))
    }

    pub async fn list_trim(&mut self, key: &str, start: isize, stop: isize) -> Result<()> {
        let full = self.full_key(key);
        let mut conn = self.connection().await?;
        conn.ltrim::<_, ()>(&full, start, stop)
            .await
            .map_err(|e| self.drop_conn_on(e))
    }

    pub async fn list_range(&mut self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let full = self.full_key(key);
        let mut conn = self.connection().await?;
        conn.lrange(&full, start, stop)
            .await
            .map_err(|e| self.drop_conn_on(e))
    }
}

#[cfg(test)]
mod tests {
    use super::CacheClient;

    fn offline_client() -> CacheClient {
        CacheClient {
            url: "redis://127.0.0.1:1/".to_string(),
            prefix: "mev:".to_string(),
            conn: None,
        }
    }

    #[test]
    fn keys_carry_the_configured_prefix() {
        let client = offline_client();
        assert_eq!(client.full_key("tx:0xabc"), "mev:tx:0xabc");
    }

    #[tokio::test]
    async fn disconnected_client_errors_instead_of_panicking() {
        let mut client = offline_client();
        assert!(!client.is_open());
        assert!(client.get("tx:0xabc").await.is_err());
        assert!(client.set_with_ttl("tx:0xabc", "{}", 300).await.is_err());
        assert!(client.keys_by_prefix("tx:").await.is_err());
    }
}
