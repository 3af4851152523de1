use anyhow::Result;
use redis::{AsyncCommands, Client};

/// Key under which a revoked access token is parked until it would have
/// expired anyway. Absence of the key means "not revoked".
pub fn blacklist_key(token: &str) -> String {
    format!("token-blacklist:{token}")
}

#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_key_embeds_token() {
        assert_eq!(blacklist_key("abc"), "token-blacklist:abc");
    }
}
