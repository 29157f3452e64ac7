//! Redis hash commands (enable with the `redis` feature).

use redis::{Client, Connection};

use super::{HashCommands, Result};

/// [`HashCommands`] over a Redis server.
///
/// A connection is opened per command, so the type is cheap to share and
/// recovers from dropped connections on the next call.
#[derive(Debug, Clone)]
pub struct RedisCommands {
    client: Client,
}

impl RedisCommands {
    /// Validate `url` (e.g. `redis://127.0.0.1/`). No connection is made yet.
    pub fn open(url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::open(url)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn connection(&self) -> Result<Connection> {
        Ok(self.client.get_connection()?)
    }
}

impl HashCommands for RedisCommands {
    fn hset(&self, key: &str, field: &str, value: &str) -> Result<i64> {
        let mut conn = self.connection()?;
        let reply = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query::<i64>(&mut conn)?;
        Ok(reply)
    }

    fn hgetall(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.connection()?;
        let reply = redis::cmd("HGETALL")
            .arg(key)
            .query::<Vec<Vec<u8>>>(&mut conn)?;
        Ok(reply)
    }
}
