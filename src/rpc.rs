//! HTTP bindings to a Sui fullnode: JSON-RPC reads for committee and system
//! state, and a polling checkpoint event source.
//!
//! All numeric fields cross the wire as decimal strings; parse failures are
//! data errors, not transport errors.

use crate::{
    committee::{
        CommitteeError, CommitteeInfo, CommitteeMember, CommitteeSource, SystemState,
        ValidatorMetadata,
    },
    subscriber::{EventSource, StreamError},
    types::{CheckpointSignatures, Epoch, SequenceNumber},
};
use futures::stream::{BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};

/// Cursor value before the first subscription anchors it at the live head.
const CURSOR_UNSET: u64 = u64::MAX;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Data(String),
}

impl From<RpcError> for StreamError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Http(_) => StreamError::Transport(err.to_string()),
            _ => StreamError::Other(err.to_string()),
        }
    }
}

impl From<RpcError> for CommitteeError {
    fn from(err: RpcError) -> Self {
        CommitteeError::Source(err.to_string())
    }
}

#[derive(Deserialize)]
struct Envelope<R> {
    result: Option<R>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSystemState {
    epoch: String,
    #[serde(default)]
    active_validators: Vec<RawActiveValidator>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActiveValidator {
    sui_address: String,
    name: String,
    #[serde(default)]
    protocol_pubkey_bytes: String,
}

/// `validators` entries are `[protocol_pubkey, stake]` string pairs.
#[derive(Deserialize)]
struct RawCommitteeInfo {
    epoch: String,
    validators: Vec<(String, String)>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCheckpoint {
    sequence_number: String,
    epoch: String,
    signature: Option<RawSignature>,
}

#[derive(Deserialize)]
struct RawSignature {
    #[serde(default)]
    bitmap: Vec<u32>,
}

fn parse_u64(field: &str, value: &str) -> Result<u64, RpcError> {
    value
        .parse()
        .map_err(|_| RpcError::Data(format!("{field} is not a u64: {value:?}")))
}

/// JSON-RPC client for one fullnode endpoint. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    url: String,
}

impl Client {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, RpcError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, "rpc call");
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let envelope: Envelope<R> = response.json().await?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| RpcError::Data(format!("{method}: response has no result")))
    }

    async fn latest_sequence(&self) -> Result<SequenceNumber, RpcError> {
        let raw: String = self
            .call("sui_getLatestCheckpointSequenceNumber", json!([]))
            .await?;
        parse_u64("sequence", &raw)
    }

    async fn checkpoint(&self, sequence: SequenceNumber) -> Result<CheckpointSignatures, RpcError> {
        let raw: RawCheckpoint = self
            .call("sui_getCheckpoint", json!([sequence.to_string()]))
            .await?;
        Ok(CheckpointSignatures {
            sequence: parse_u64("sequenceNumber", &raw.sequence_number)?,
            epoch: parse_u64("epoch", &raw.epoch)?,
            signers: raw.signature.map(|s| s.bitmap),
        })
    }
}

impl CommitteeSource for Client {
    async fn latest_system_state(&self) -> Result<SystemState, CommitteeError> {
        let raw: RawSystemState = self
            .call("suix_getLatestSuiSystemState", json!([]))
            .await?;
        let epoch = raw
            .epoch
            .parse()
            .map_err(|_| CommitteeError::EpochUnresolved)?;
        Ok(SystemState {
            epoch,
            validators: raw
                .active_validators
                .into_iter()
                .map(|v| ValidatorMetadata {
                    name: v.name,
                    sui_address: v.sui_address,
                    protocol_pubkey: v.protocol_pubkey_bytes,
                })
                .collect(),
        })
    }

    async fn committee_info(&self, epoch: Epoch) -> Result<CommitteeInfo, CommitteeError> {
        let raw: RawCommitteeInfo = self
            .call("suix_getCommitteeInfo", json!([epoch.to_string()]))
            .await?;
        let resolved = parse_u64("epoch", &raw.epoch)?;
        let members = raw
            .validators
            .into_iter()
            .map(|(protocol_pubkey, stake)| {
                Ok(CommitteeMember {
                    voting_power: parse_u64("stake", &stake)?,
                    protocol_pubkey,
                })
            })
            .collect::<Result<_, RpcError>>()?;
        Ok(CommitteeInfo {
            epoch: resolved,
            members,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Delay between polls when the next checkpoint is not yet available.
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// An [EventSource] that tails the fullnode's checkpoint read API.
///
/// The first subscription anchors a cursor at the live head; the cursor is
/// shared across resubscriptions so a reconnect neither re-delivers nor
/// skips a checkpoint.
pub struct HttpEventSource {
    client: Client,
    cfg: PollerConfig,
    cursor: Arc<AtomicU64>,
}

impl HttpEventSource {
    pub fn new(client: Client, cfg: PollerConfig) -> Self {
        Self {
            client,
            cfg,
            cursor: Arc::new(AtomicU64::new(CURSOR_UNSET)),
        }
    }
}

impl EventSource for HttpEventSource {
    type Stream = BoxStream<'static, Result<CheckpointSignatures, StreamError>>;

    async fn subscribe(&mut self) -> Result<Self::Stream, StreamError> {
        if self.cursor.load(Ordering::Acquire) == CURSOR_UNSET {
            let latest = self.client.latest_sequence().await?;
            self.cursor.store(latest, Ordering::Release);
            info!(sequence = latest, "anchored checkpoint cursor at live head");
        }
        let poller = Poller {
            client: self.client.clone(),
            cursor: self.cursor.clone(),
            interval: self.cfg.poll_interval,
        };
        Ok(futures::stream::unfold(poller, |poller| async move {
            let item = poller.next_event().await;
            Some((item, poller))
        })
        .boxed())
    }
}

struct Poller {
    client: Client,
    cursor: Arc<AtomicU64>,
    interval: Duration,
}

impl Poller {
    /// Fetches the checkpoint at the cursor, waiting out the poll interval
    /// while it is not yet available. Transport failures surface as stream
    /// errors so the resilience loop owns all reconnect behavior.
    async fn next_event(&self) -> Result<CheckpointSignatures, StreamError> {
        loop {
            let next = self.cursor.load(Ordering::Acquire);
            match self.client.checkpoint(next).await {
                Ok(event) => {
                    self.cursor.store(next + 1, Ordering::Release);
                    return Ok(event);
                }
                Err(RpcError::Rpc { code, message }) => {
                    // The node answers with an rpc error until the sequence
                    // exists.
                    debug!(sequence = next, code, %message, "checkpoint not yet available");
                    tokio::time::sleep(self.interval).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_state_decoding() {
        let raw: Envelope<RawSystemState> = serde_json::from_str(
            r#"{
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "epoch": "748",
                    "activeValidators": [
                        {
                            "suiAddress": "0xabc",
                            "name": "Example Validator",
                            "protocolPubkeyBytes": "mF4...",
                            "nextEpochStake": "ignored"
                        }
                    ]
                }
            }"#,
        )
        .unwrap();
        let state = raw.result.unwrap();
        assert_eq!(state.epoch, "748");
        assert_eq!(state.active_validators.len(), 1);
        assert_eq!(state.active_validators[0].sui_address, "0xabc");
        assert_eq!(state.active_validators[0].protocol_pubkey_bytes, "mF4...");
    }

    #[test]
    fn test_committee_info_decoding() {
        let raw: RawCommitteeInfo = serde_json::from_str(
            r#"{"epoch": "748", "validators": [["pk-a", "9007"], ["pk-b", "1203"]]}"#,
        )
        .unwrap();
        assert_eq!(raw.epoch, "748");
        assert_eq!(raw.validators[0], ("pk-a".to_string(), "9007".to_string()));
        assert_eq!(raw.validators[1].1, "1203");
    }

    #[test]
    fn test_checkpoint_decoding() {
        let raw: RawCheckpoint = serde_json::from_str(
            r#"{
                "sequenceNumber": "68112313",
                "epoch": "748",
                "signature": {"bitmap": [0, 2, 5]}
            }"#,
        )
        .unwrap();
        assert_eq!(raw.sequence_number, "68112313");
        assert_eq!(raw.signature.unwrap().bitmap, vec![0, 2, 5]);
    }

    #[test]
    fn test_checkpoint_without_signature_decodes_to_none() {
        let raw: RawCheckpoint =
            serde_json::from_str(r#"{"sequenceNumber": "7", "epoch": "1"}"#).unwrap();
        assert!(raw.signature.is_none());
    }

    #[test]
    fn test_error_envelope() {
        let raw: Envelope<RawCheckpoint> = serde_json::from_str(
            r#"{
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32602, "message": "Checkpoint not found"}
            }"#,
        )
        .unwrap();
        assert!(raw.result.is_none());
        let err = raw.error.unwrap();
        assert_eq!(err.code, -32602);
        assert_eq!(err.message, "Checkpoint not found");
    }

    #[test]
    fn test_parse_u64_rejects_garbage() {
        assert!(parse_u64("epoch", "748").is_ok());
        assert!(matches!(
            parse_u64("epoch", "0x2ec"),
            Err(RpcError::Data(_))
        ));
        assert!(parse_u64("epoch", "-1").is_err());
    }

    #[test]
    fn test_rpc_error_maps_to_retryable_stream_error() {
        let err: StreamError = RpcError::Rpc {
            code: -32000,
            message: "busy".into(),
        }
        .into();
        assert!(!err.is_terminal());
    }
}
