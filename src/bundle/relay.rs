//! Bundle relay client
//!
//! Submission is fire-and-forget: `submit` returns a bundle id once the
//! relay accepts the bundle for forwarding, which is not confirmation of
//! inclusion. Result observation is asynchronous, polling the relay until a
//! terminal status or an explicit timeout, after which an unknown outcome
//! is reported instead of waiting indefinitely.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{TransactionEnvelope, MAX_BUNDLE_TRANSACTIONS};
use crate::errors::VolumeBotError;

/// Tip account credited by the funding envelope's tip transfer
pub const RELAY_TIP_ACCOUNT: Pubkey =
    solana_sdk::pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5");

/// Terminal result of observing one submitted bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleOutcome {
    /// The bundle landed on chain
    Landed {
        slot: u64,
        /// Compute units consumed, when the relay reports them
        compute_consumed: Option<u64>,
    },
    /// The relay reported a terminal failure
    Dropped { reason: String },
    /// No terminal status arrived before the observation timeout
    Unknown,
}

/// Ordered-bundle submission and asynchronous result observation
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submit signed envelopes for atomic relay; returns the bundle id on
    /// acceptance
    async fn submit(&self, envelopes: &[TransactionEnvelope]) -> Result<String, VolumeBotError>;

    /// Observe a submitted bundle; the receiver resolves exactly once
    fn watch(&self, bundle_id: String) -> oneshot::Receiver<BundleOutcome>;
}

struct RelayInner {
    http: reqwest::Client,
    endpoint: String,
}

impl RelayInner {
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, VolumeBotError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| VolumeBotError::BundleSubmission(format!("{}: {}", method, e)))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| VolumeBotError::BundleSubmission(format!("{} response: {}", method, e)))?;
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown relay error");
            return Err(VolumeBotError::BundleSubmission(format!(
                "{}: {}",
                method, message
            )));
        }
        Ok(value)
    }

    /// One status poll; None while the bundle is still pending
    async fn poll_status(&self, bundle_id: &str) -> Result<Option<BundleOutcome>, VolumeBotError> {
        let value = self
            .rpc_call("getBundleStatuses", json!([[bundle_id]]))
            .await?;
        let Some(status) = value
            .pointer("/result/value/0")
            .filter(|entry| !entry.is_null())
        else {
            return Ok(None);
        };

        if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
            // The relay encodes success as {"Ok": null}
            if err.get("Ok").map(Value::is_null) != Some(true) {
                return Ok(Some(BundleOutcome::Dropped {
                    reason: err.to_string(),
                }));
            }
        }

        match status.get("confirmation_status").and_then(Value::as_str) {
            Some("confirmed") | Some("finalized") => Ok(Some(BundleOutcome::Landed {
                slot: status.get("slot").and_then(Value::as_u64).unwrap_or(0),
                compute_consumed: status
                    .get("compute_units_consumed")
                    .and_then(Value::as_u64),
            })),
            _ => Ok(None),
        }
    }
}

/// Relay client speaking the block-engine JSON-RPC bundle API
pub struct JitoRelayClient {
    inner: Arc<RelayInner>,
    poll_interval: Duration,
    result_timeout: Duration,
}

impl JitoRelayClient {
    pub fn new(endpoint: impl Into<String>, poll_interval: Duration, result_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                http: reqwest::Client::new(),
                endpoint: endpoint.into(),
            }),
            poll_interval,
            result_timeout,
        }
    }
}

#[async_trait]
impl BundleRelay for JitoRelayClient {
    async fn submit(&self, envelopes: &[TransactionEnvelope]) -> Result<String, VolumeBotError> {
        if envelopes.is_empty() {
            return Err(VolumeBotError::BundleSubmission("empty bundle".to_string()));
        }
        if envelopes.len() > MAX_BUNDLE_TRANSACTIONS {
            return Err(VolumeBotError::BundleSubmission(format!(
                "{} transactions exceeds the {}-transaction bundle limit",
                envelopes.len(),
                MAX_BUNDLE_TRANSACTIONS
            )));
        }

        let mut encoded = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let wire = bincode::serialize(&envelope.tx).map_err(|e| {
                VolumeBotError::BundleSubmission(format!("serialize transaction: {}", e))
            })?;
            encoded.push(base64::engine::general_purpose::STANDARD.encode(wire));
        }

        let value = self
            .inner
            .rpc_call("sendBundle", json!([encoded, {"encoding": "base64"}]))
            .await?;
        let bundle_id = value
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                VolumeBotError::BundleSubmission("relay returned no bundle id".to_string())
            })?
            .to_string();

        debug!(bundle_id = %bundle_id, transactions = envelopes.len(), "Bundle accepted for relay");
        Ok(bundle_id)
    }

    fn watch(&self, bundle_id: String) -> oneshot::Receiver<BundleOutcome> {
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let poll_interval = self.poll_interval;
        let deadline = Instant::now() + self.result_timeout;

        tokio::spawn(async move {
            let outcome = loop {
                if Instant::now() >= deadline {
                    break BundleOutcome::Unknown;
                }
                tokio::time::sleep(poll_interval).await;
                match inner.poll_status(&bundle_id).await {
                    Ok(Some(outcome)) => break outcome,
                    Ok(None) => continue,
                    Err(err) => {
                        // Transient poll failures do not end observation
                        debug!(bundle_id = %bundle_id, %err, "Status poll failed");
                    }
                }
            };
            if tx.send(outcome).is_err() {
                warn!(bundle_id = %bundle_id, "Bundle observer dropped before result arrived");
            }
        });

        rx
    }
}
