//! Redis-backed session directory

use alic_util::to_epoch_seconds;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{DirectoryError, DirectoryResult, SessionDirectory, Ttl};

/// Keys fetched per SCAN round trip
const SCAN_COUNT: usize = 100;

/// Where to find the Redis server
#[derive(Clone)]
pub struct RedisTarget {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

/// Session directory stored in Redis, relying on native key expiry.
///
/// Every command is bounded by `timeout`; an elapsed bound surfaces as
/// [`DirectoryError::Timeout`] naming the operation.
pub struct RedisDirectory {
    conn: MultiplexedConnection,
    timeout: Duration,
}

impl RedisDirectory {
    pub async fn connect(target: RedisTarget, timeout: Duration) -> DirectoryResult<Self> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(target.host.clone(), target.port),
            redis: RedisConnectionInfo {
                db: target.db,
                password: target.password,
                ..Default::default()
            },
        };
        let client = Client::open(info)?;

        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| DirectoryError::Timeout { op: "connect" })??;

        info!(host = %target.host, port = target.port, db = target.db, "Connected to Redis");
        Ok(Self { conn, timeout })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> DirectoryResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Redis call timed out");
                Err(DirectoryError::Timeout { op })
            }
        }
    }

    /// True when the conditional write happened
    async fn set_conditional(
        &self,
        op: &'static str,
        key: &str,
        condition: &str,
        ttl: Ttl,
    ) -> DirectoryResult<bool> {
        let cmd = set_command(key, condition, ttl);
        let mut conn = self.conn.clone();
        let reply: redis::Value = self.bounded(op, cmd.query_async(&mut conn)).await?;
        Ok(write_applied(&reply)?)
    }
}

/// `SET key 1 NX|XX EX secs|EXAT ts`
fn set_command(key: &str, condition: &str, ttl: Ttl) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(1).arg(condition);
    match ttl {
        Ttl::Relative(d) => cmd.arg("EX").arg(d.as_secs().max(1)),
        Ttl::Absolute(at) => cmd.arg("EXAT").arg(to_epoch_seconds(at)),
    };
    cmd
}

/// A conditional SET answers OK when written and nil when the condition failed
fn write_applied(reply: &redis::Value) -> redis::RedisResult<bool> {
    let reply: Option<String> = redis::from_redis_value(reply)?;
    Ok(reply.is_some())
}

#[async_trait]
impl SessionDirectory for RedisDirectory {
    async fn insert(&self, key: &str, ttl: Ttl) -> DirectoryResult<bool> {
        self.set_conditional("insert", key, "NX", ttl).await
    }

    async fn refresh(&self, key: &str, ttl: Ttl) -> DirectoryResult<bool> {
        self.set_conditional("refresh", key, "XX", ttl).await
    }

    async fn exists(&self, key: &str) -> DirectoryResult<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.bounded("exists", cmd.query_async(&mut conn)).await?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> DirectoryResult<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.bounded("delete", cmd.query_async(&mut conn)).await?;
        Ok(removed > 0)
    }

    async fn scan(&self, pattern: &str) -> DirectoryResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT);
            let (next, batch): (u64, Vec<String>) =
                self.bounded("scan", cmd.query_async(&mut conn)).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may repeat a key across batches
        keys.sort();
        keys.dedup();
        debug!(pattern, count = keys.len(), "Scanned session keys");
        Ok(keys)
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("PING");
        let pong: DirectoryResult<String> = self.bounded("ping", cmd.query_async(&mut conn)).await;
        match pong {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                false
            }
        }
    }
}
