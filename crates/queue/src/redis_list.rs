//! Redis list queue driver.
//!
//! Producers `RPUSH` JSON-encoded messages onto `{prefix}:queue:{name}`
//! and the consume loop `BLPOP`s from the other end, so each list is FIFO.
//! Messages are removed when popped, before any handler runs.
//!
//! Both connections reconnect forever at the configured back-off, so a
//! dropped socket stalls the loop only until the server is reachable again.

use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Client;
use fred::interfaces::{ClientLike, ListInterface};
use fred::types::config::{Blocking, Config as RedisConfig, ReconnectPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::driver::{Delivery, Driver, dispatch};
use crate::error::{QueueError, QueueResult};
use crate::message::Message;

/// Default back-off after a transport error.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// How long `consume` waits for its dedicated connection to quit.
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis key holding the named queue.
#[must_use]
pub fn queue_key(prefix: &str, queue_name: &str) -> String {
    format!("{prefix}:queue:{queue_name}")
}

/// Reconnect without limit, waiting `backoff` between attempts.
fn reconnect_policy(backoff: Duration) -> ReconnectPolicy {
    let delay = u32::try_from(backoff.as_millis()).unwrap_or(u32::MAX);
    ReconnectPolicy::new_constant(0, delay)
}

/// Decode a popped payload. Undecodable payloads are logged and dropped;
/// they are never retried or dead-lettered.
fn decode_payload(queue_name: &str, payload: &str) -> Option<Message> {
    match Message::from_json(payload) {
        Ok(message) => Some(message),
        Err(e) => {
            error!(queue = queue_name, error = %e, "Dropping undecodable message");
            None
        }
    }
}

/// Driver backed by Redis lists, for deployments spanning several processes.
pub struct RedisListDriver {
    client: Client,
    config: RedisConfig,
    prefix: String,
    error_backoff: Duration,
}

impl RedisListDriver {
    /// Connect to the Redis server or cluster described by `config`.
    pub async fn connect(
        config: &courier_common::RedisConfig,
        error_backoff: Duration,
    ) -> QueueResult<Self> {
        let redis_config = RedisConfig::from_url(&config.url)?;
        let clustered = redis_config.server.is_clustered();

        let client = Client::new(
            redis_config.clone(),
            None,
            None,
            Some(reconnect_policy(error_backoff)),
        );
        client.init().await?;

        info!(
            clustered,
            prefix = %config.prefix,
            "Initialized Redis list queue driver"
        );

        Ok(Self {
            client,
            config: redis_config,
            prefix: config.prefix.clone(),
            error_backoff,
        })
    }

    fn key(&self, queue_name: &str) -> String {
        queue_key(&self.prefix, queue_name)
    }

    /// Open the connection a consume loop blocks on.
    ///
    /// Blocking pops stall every other command on their connection, so each
    /// loop gets its own. `Interrupt` lets the final `QUIT` unblock a pending pop.
    async fn blocking_client(&self) -> QueueResult<Client> {
        let mut config = self.config.clone();
        config.blocking = Blocking::Interrupt;

        let client = Client::new(config, None, None, Some(reconnect_policy(self.error_backoff)));
        client.init().await?;
        Ok(client)
    }

    async fn pop_loop(
        &self,
        client: &Client,
        queue_name: &str,
        delivery: &Delivery,
        cancel: &CancellationToken,
    ) -> QueueResult<()> {
        let key = self.key(queue_name);

        loop {
            let popped: Option<(String, String)> = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(QueueError::Cancelled),
                popped = client.blpop(key.as_str(), 0.0) => match popped {
                    Ok(popped) => popped,
                    // fred reports transport failures as `Canceled` too, so only
                    // the token decides whether this loop is shutting down.
                    Err(_) if cancel.is_cancelled() => return Err(QueueError::Cancelled),
                    Err(e) => {
                        error!(queue = queue_name, error = %e, "Failed to pop from Redis");
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => return Err(QueueError::Cancelled),
                            () = tokio::time::sleep(self.error_backoff) => {}
                        }
                        continue;
                    }
                },
            };

            // Nil reply: nothing arrived before the pop returned.
            let Some((_, payload)) = popped else {
                continue;
            };

            if let Some(message) = decode_payload(queue_name, &payload) {
                debug!(
                    queue = queue_name,
                    message_type = %message.message_type,
                    retry_count = message.retry_count,
                    "Received message from Redis"
                );
                dispatch(delivery, queue_name, message);
            }
        }
    }
}

#[async_trait]
impl Driver for RedisListDriver {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn publish(
        &self,
        queue_name: &str,
        message: Message,
        cancel: &CancellationToken,
    ) -> QueueResult<()> {
        let payload = message.to_json()?;
        let key = self.key(queue_name);

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(QueueError::Cancelled),
            pushed = self.client.rpush::<i64, _, _>(key.as_str(), payload) => {
                pushed?;
                Ok(())
            }
        }
    }

    async fn consume(
        &self,
        queue_name: &str,
        delivery: Delivery,
        cancel: &CancellationToken,
    ) -> QueueResult<()> {
        let client = self.blocking_client().await?;
        info!(queue = queue_name, "Consuming from Redis list");

        let result = self.pop_loop(&client, queue_name, &delivery, cancel).await;

        match tokio::time::timeout(QUIT_TIMEOUT, client.quit()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(queue = queue_name, error = %e, "Failed to close consumer connection"),
            Err(_) => warn!(queue = queue_name, "Timed out closing consumer connection"),
        }

        result
    }

    async fn pending(&self, queue_name: &str) -> QueueResult<usize> {
        let len: usize = self.client.llen(self.key(queue_name).as_str()).await?;
        Ok(len)
    }

    async fn close(&self) -> QueueResult<()> {
        if self.client.is_connected() {
            self.client.quit().await?;
            info!("Closed Redis list queue driver");
        }
        Ok(())
    }
}
