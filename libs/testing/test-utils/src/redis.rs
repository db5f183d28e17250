//! Redis test infrastructure
//!
//! `TestRedis` starts a throwaway Redis container for stream tests.

use redis::aio::ConnectionManager;
use redis::Client;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// Test Redis wrapper. The container is stopped and removed on drop.
pub struct TestRedis {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    client: Client,
    pub connection_string: String,
}

impl TestRedis {
    /// Start Redis 8 Alpine on a random host port
    pub async fn new() -> Self {
        let container = Redis::default()
            .with_tag("8-alpine")
            .start()
            .await
            .expect("Failed to start Redis container");

        let host_port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let connection_string = format!("redis://127.0.0.1:{}", host_port);
        let client = Client::open(connection_string.clone()).expect("Failed to create Redis client");

        tracing::info!(port = host_port, "Test Redis ready (Redis 8-alpine)");

        Self {
            container,
            client,
            connection_string,
        }
    }

    /// Reconnecting connection, the kind stream producers and consumers hold
    pub async fn connection_manager(&self) -> ConnectionManager {
        ConnectionManager::new(self.client.clone())
            .await
            .expect("Failed to create ConnectionManager")
    }

    /// Get the connection string for manual client creation
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestRedis {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test Redis container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_roundtrip() {
        let redis = TestRedis::new().await;
        let mut conn = redis.connection_manager().await;

        let id: String = redis::cmd("XADD")
            .arg("test:stream")
            .arg("*")
            .arg("job")
            .arg("{}")
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(!id.is_empty());

        let len: i64 = redis::cmd("XLEN")
            .arg("test:stream")
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(len, 1);
    }
}
