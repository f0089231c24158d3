//! JSON-RPC client for a ledger endpoint.
//!
//! Every call is a `POST` of `{"action": ..., <params>}` to the endpoint URL.
//! Replies carry either `{"result": ...}` or `{"error": "...", "code": "..."}`;
//! the `code` selects the [`EndpointError`] variant.

use std::sync::RwLock;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tally_types::{BallotId, VoterId, WireVote};

use crate::{validate_contract_address, EndpointError, LedgerEndpoint, TxReceipt};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A ledger endpoint reached over HTTP.
pub struct HttpEndpoint {
    name: String,
    url: String,
    http: reqwest::Client,
    contract: RwLock<Option<String>>,
}

impl HttpEndpoint {
    /// Create a client for `url` with a per-request timeout.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, EndpointError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(request_timeout))
            .build()
            .map_err(|e| EndpointError::Unreachable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            http,
            contract: RwLock::new(None),
        })
    }

    /// The currently bound contract address.
    pub fn contract(&self) -> Option<String> {
        self.contract
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn bound_contract(&self) -> Result<String, EndpointError> {
        self.contract()
            .ok_or_else(|| EndpointError::NoContract("no contract bound".into()))
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T, EndpointError> {
        let mut body = params;
        body.as_object_mut()
            .ok_or_else(|| EndpointError::InvalidResponse("params must be a JSON object".into()))?
            .insert("action".to_string(), json!(action));

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EndpointError::Timeout(format!("{action}: {e}"))
                } else {
                    EndpointError::Unreachable(format!("{action}: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(EndpointError::Unreachable(format!("{action}: HTTP {status}")));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| EndpointError::InvalidResponse(format!("{action}: {e}")))?;

        if let Some(message) = json.get("error").and_then(|e| e.as_str()) {
            let code = json.get("code").and_then(|c| c.as_str()).unwrap_or_default();
            return Err(map_error_code(code, message));
        }
        if !status.is_success() {
            return Err(EndpointError::InvalidResponse(format!("{action}: HTTP {status}")));
        }

        let result = json.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| EndpointError::InvalidResponse(format!("{action}: {e}")))
    }
}

fn map_error_code(code: &str, message: &str) -> EndpointError {
    match code {
        "already_exists" | "already_voted" => EndpointError::AlreadyExists(message.to_string()),
        "no_contract" => EndpointError::NoContract(message.to_string()),
        "invalid_address" => EndpointError::InvalidAddress(message.to_string()),
        "unavailable" => EndpointError::Unreachable(message.to_string()),
        _ => EndpointError::Rejected(message.to_string()),
    }
}

impl LedgerEndpoint for HttpEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn is_listening(&self) -> Result<bool, EndpointError> {
        self.call("listening", json!({})).await
    }

    async fn accounts(&self) -> Result<Vec<String>, EndpointError> {
        self.call("accounts", json!({})).await
    }

    async fn block_height(&self) -> Result<u64, EndpointError> {
        self.call("block_number", json!({})).await
    }

    async fn bind_contract(&self, address: &str) -> Result<(), EndpointError> {
        validate_contract_address(address)?;
        let code: String = self.call("get_code", json!({ "address": address })).await?;
        let code = code.trim();
        if code.is_empty() || code == "0x" {
            return Err(EndpointError::NoContract(address.to_string()));
        }
        *self
            .contract
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(address.to_string());
        tracing::debug!(endpoint = %self.name, contract = address, "contract bound");
        Ok(())
    }

    async fn submit_vote(&self, from: &str, vote: &WireVote) -> Result<TxReceipt, EndpointError> {
        let contract = self.bound_contract()?;
        self.call(
            "submit_vote",
            json!({ "contract": contract, "from": from, "vote": vote }),
        )
        .await
    }

    async fn vote_exists(&self, ballot: &BallotId) -> Result<bool, EndpointError> {
        let contract = self.bound_contract()?;
        self.call(
            "vote_exists",
            json!({ "contract": contract, "ballot_id": ballot }),
        )
        .await
    }

    async fn get_vote(&self, ballot: &BallotId) -> Result<WireVote, EndpointError> {
        let contract = self.bound_contract()?;
        self.call("get_vote", json!({ "contract": contract, "ballot_id": ballot }))
            .await
    }

    async fn get_all_votes(&self) -> Result<Vec<BallotId>, EndpointError> {
        let contract = self.bound_contract()?;
        self.call("get_all_votes", json!({ "contract": contract })).await
    }

    async fn get_total_votes(&self) -> Result<u64, EndpointError> {
        let contract = self.bound_contract()?;
        self.call("get_total_votes", json!({ "contract": contract })).await
    }

    async fn has_voted(&self, voter: &VoterId) -> Result<bool, EndpointError> {
        let contract = self.bound_contract()?;
        self.call("has_voted", json!({ "contract": contract, "voter_id": voter }))
            .await
    }

    async fn reset_votes(&self, from: &str) -> Result<(), EndpointError> {
        let contract = self.bound_contract()?;
        let _: Value = self
            .call("reset_votes", json!({ "contract": contract, "from": from }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    async fn stub(Json(body): Json<Value>) -> Json<Value> {
        let reply = match body["action"].as_str().unwrap_or_default() {
            "listening" => json!({ "result": true }),
            "accounts" => json!({ "result": ["0xabc"] }),
            "get_code" if body["address"] == CONTRACT => json!({ "result": "0x6080" }),
            "get_code" => json!({ "result": "0x" }),
            "get_total_votes" => json!({ "result": 2 }),
            "get_all_votes" => json!({ "result": ["B1", "B2"] }),
            "submit_vote" => json!({ "error": "Vote already exists", "code": "already_exists" }),
            _ => json!({ "error": "unsupported", "code": "bad_request" }),
        };
        Json(reply)
    }

    async fn serve() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/", post(stub)))
                .await
                .unwrap();
        });
        format!("http://{addr}/")
    }

    fn client(url: &str) -> HttpEndpoint {
        HttpEndpoint::new("primary", url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn contract_calls_require_binding() {
        let endpoint = client(&serve().await);
        assert!(endpoint.is_listening().await.unwrap());
        assert!(matches!(
            endpoint.get_total_votes().await,
            Err(EndpointError::NoContract(_))
        ));

        endpoint.bind_contract(CONTRACT).await.unwrap();
        assert_eq!(endpoint.get_total_votes().await.unwrap(), 2);
        let ballots = endpoint.get_all_votes().await.unwrap();
        assert_eq!(ballots[1].as_str(), "B2");
    }

    #[tokio::test]
    async fn empty_code_is_no_contract() {
        let endpoint = client(&serve().await);
        let other = "0x0000000000000000000000000000000000000001";
        assert!(matches!(
            endpoint.bind_contract(other).await,
            Err(EndpointError::NoContract(_))
        ));
        assert!(endpoint.contract().is_none());
    }

    #[tokio::test]
    async fn malformed_address_never_hits_the_network() {
        let endpoint = client("http://127.0.0.1:9/");
        assert!(matches!(
            endpoint.bind_contract("not-an-address").await,
            Err(EndpointError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn error_code_maps_to_kind() {
        let endpoint = client(&serve().await);
        endpoint.bind_contract(CONTRACT).await.unwrap();
        let vote = WireVote {
            voter_id: VoterId::parse("V1").unwrap(),
            ballot_id: BallotId::parse("B1").unwrap(),
            votes_payload: "[]".into(),
            timestamp_secs: 1,
            voter_hash: "h".into(),
        };
        let err = endpoint.submit_vote("0xabc", &vote).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let endpoint = client(&format!("http://{addr}/"));
        let err = endpoint.is_listening().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transient);
    }
}
