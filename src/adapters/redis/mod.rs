use std::sync::Arc;

pub mod rate_limit_repo;

pub use rate_limit_repo::ValkeyRateLimitStore;

#[derive(Debug)]
pub struct RedisClient {
    connection: redis::aio::ConnectionManager,
}

impl RedisClient {
    /// Connects to a Redis/Valkey server.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn new(url: &str) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        Ok(Arc::new(Self { connection }))
    }

    /// Returns a multiplexed connection for standard commands.
    #[must_use]
    pub fn connection(&self) -> redis::aio::ConnectionManager {
        self.connection.clone()
    }

    /// Pings the server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.connection();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
