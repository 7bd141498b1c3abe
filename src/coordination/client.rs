use std::time::Duration;

use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::{AsyncCommands, Script};

use crate::engine::Dimension;

use super::script::{ADMIT_SCRIPT, RECONCILE_SCRIPT};

/// Outcome of one atomic admission batch (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutcome {
    Admit,
    Deny { dimension: Dimension, retry_at: f64 },
}

/// Non-mutating snapshot of the three counter sums for one key, for
/// `GET /v1/usage/{api_key}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageSnapshot {
    pub input_tokens_used: u64,
    pub output_tokens_used: u64,
    pub requests_used: u64,
}

/// Thin async client around a pooled Redis connection, exposing only the
/// two atomic operations §4.1 requires plus a read-only usage query. The
/// pool (`deadpool-redis`) gives the bounded, FIFO-acquiring connection
/// pool §5 requires; acquisition timeout surfaces as `CoordinationUnavailable`
/// to the caller, never as a silent admit.
#[derive(Clone)]
pub struct CoordinationClient {
    pool: Pool,
    admit_script: std::sync::Arc<Script>,
    reconcile_script: std::sync::Arc<Script>,
    acquire_timeout: Duration,
    command_timeout: Duration,
}

impl CoordinationClient {
    /// Build the pool and script handles. Does not perform any network
    /// I/O — call `ping` afterwards to verify connectivity before serving
    /// traffic.
    pub fn new(
        redis_url: &str,
        pool_size: usize,
        acquire_timeout: Duration,
        command_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut cfg = PoolConfig::from_url(redis_url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(pool_size.max(16)));

        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;

        Ok(Self {
            pool,
            admit_script: std::sync::Arc::new(Script::new(ADMIT_SCRIPT)),
            reconcile_script: std::sync::Arc::new(Script::new(RECONCILE_SCRIPT)),
            acquire_timeout,
            command_timeout,
        })
    }

    /// Verify the coordination store is reachable. Used both at startup
    /// (handshake, exit code 2 on exhausted retry budget) and by `/health`.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.acquire().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn acquire(&self) -> anyhow::Result<deadpool_redis::Connection> {
        match tokio::time::timeout(self.acquire_timeout, self.pool.get()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(anyhow::anyhow!("coordination pool error: {}", e)),
            Err(_) => Err(anyhow::anyhow!(
                "coordination pool acquisition timed out after {:?}",
                self.acquire_timeout
            )),
        }
    }

    fn keys(key: &str) -> [String; 5] {
        [
            format!("rate_limit:{{{}}}:input_tokens", key),
            format!("rate_limit:{{{}}}:input_tokens:costs", key),
            format!("rate_limit:{{{}}}:output_tokens", key),
            format!("rate_limit:{{{}}}:output_tokens:costs", key),
            format!("rate_limit:{{{}}}:requests", key),
        ]
    }

    /// The §4.1 atomic batch: evict, check three dimensions in order, and
    /// either commit three events or deny with a reason and retry hint.
    #[allow(clippy::too_many_arguments)]
    pub async fn admit_batch(
        &self,
        key: &str,
        limit_in: u64,
        cost_in: u64,
        limit_out: u64,
        cost_out: u64,
        limit_req: u64,
        now: f64,
        window: u64,
        event_id: &str,
    ) -> anyhow::Result<ScriptOutcome> {
        let keys = Self::keys(key);
        let mut conn = self.acquire().await?;

        let invoke = self
            .admit_script
            .key(&keys[0])
            .key(&keys[1])
            .key(&keys[2])
            .key(&keys[3])
            .key(&keys[4])
            .arg(limit_in)
            .arg(cost_in)
            .arg(limit_out)
            .arg(cost_out)
            .arg(limit_req)
            .arg(now)
            .arg(window)
            .arg(event_id)
            .invoke_async::<Vec<redis::Value>>(&mut conn);

        let reply = tokio::time::timeout(self.command_timeout, invoke)
            .await
            .map_err(|_| anyhow::anyhow!("coordination admit timed out"))??;

        parse_admit_reply(reply)
    }

    /// The §4.1 reconcile operation. Idempotent for a fixed `(event_id,
    /// new_cost)` pair — replaying it lands on the same state.
    pub async fn reconcile(
        &self,
        key: &str,
        event_id: &str,
        _old_cost: u64,
        new_cost: u64,
    ) -> anyhow::Result<()> {
        let keys = Self::keys(key);
        let mut conn = self.acquire().await?;

        let invoke = self
            .reconcile_script
            .key(&keys[2])
            .key(&keys[3])
            .arg(event_id)
            .arg(new_cost)
            .invoke_async::<i64>(&mut conn);

        tokio::time::timeout(self.command_timeout, invoke)
            .await
            .map_err(|_| anyhow::anyhow!("coordination reconcile timed out"))??;

        Ok(())
    }

    /// Read-only snapshot of non-expired sums for `/v1/usage/{api_key}`.
    /// Performs no eviction and no writes.
    pub async fn usage(&self, key: &str, now: f64, window: u64) -> anyhow::Result<UsageSnapshot> {
        let keys = Self::keys(key);
        let cutoff = now - window as f64;
        let mut conn = self.acquire().await?;

        let input_tokens_used = sum_costs(&mut conn, &keys[0], &keys[1], cutoff).await?;
        let output_tokens_used = sum_costs(&mut conn, &keys[2], &keys[3], cutoff).await?;
        let requests_used: u64 = conn.zcount(&keys[4], cutoff, "+inf").await?;

        Ok(UsageSnapshot {
            input_tokens_used,
            output_tokens_used,
            requests_used,
        })
    }
}

async fn sum_costs(
    conn: &mut deadpool_redis::Connection,
    zset: &str,
    costs: &str,
    cutoff: f64,
) -> anyhow::Result<u64> {
    let members: Vec<String> = conn.zrangebyscore(zset, cutoff, "+inf").await?;
    if members.is_empty() {
        return Ok(0);
    }
    let values: Vec<Option<u64>> = conn.hmget(costs, &members).await?;
    Ok(values.into_iter().flatten().sum())
}

fn parse_admit_reply(reply: Vec<redis::Value>) -> anyhow::Result<ScriptOutcome> {
    let tag = reply
        .first()
        .and_then(|v| match v {
            redis::Value::Int(i) => Some(*i),
            _ => None,
        })
        .ok_or_else(|| anyhow::anyhow!("malformed admit script reply: missing tag"))?;

    if tag == 1 {
        return Ok(ScriptOutcome::Admit);
    }

    let dimension_str = reply
        .get(1)
        .and_then(|v| match v {
            redis::Value::BulkString(b) => String::from_utf8(b.clone()).ok(),
            redis::Value::SimpleString(s) => Some(s.clone()),
            _ => None,
        })
        .ok_or_else(|| anyhow::anyhow!("malformed admit script reply: missing dimension"))?;

    let dimension = match dimension_str.as_str() {
        "INPUT_TPM" => Dimension::InputTpm,
        "OUTPUT_TPM" => Dimension::OutputTpm,
        "RPM" => Dimension::Rpm,
        other => anyhow::bail!("unknown dimension in admit reply: {}", other),
    };

    let retry_at_ms = reply
        .get(2)
        .and_then(|v| match v {
            redis::Value::Int(i) => Some(*i),
            _ => None,
        })
        .ok_or_else(|| anyhow::anyhow!("malformed admit script reply: missing retry_at"))?;

    Ok(ScriptOutcome::Deny {
        dimension,
        retry_at: retry_at_ms as f64 / 1000.0,
    })
}
