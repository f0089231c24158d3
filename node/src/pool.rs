//! The two long-lived endpoint slots and their health records.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use tally_endpoint::{EndpointError, EndpointState, LedgerEndpoint};

/// One configured endpoint: the client, its contract address and the health
/// record the monitor maintains.
pub struct EndpointSlot<E> {
    pub endpoint: Arc<E>,
    pub contract_address: String,
    pub state: RwLock<EndpointState>,
}

impl<E: LedgerEndpoint> EndpointSlot<E> {
    pub fn new(endpoint: Arc<E>, contract_address: impl Into<String>) -> Self {
        let state = EndpointState::new(endpoint.name(), endpoint.url());
        Self {
            endpoint,
            contract_address: contract_address.into(),
            state: RwLock::new(state),
        }
    }

    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    /// The signing account if the endpoint is routable right now.
    pub async fn routable_account(&self) -> Option<String> {
        let state = self.state.read().await;
        if state.is_routable() {
            state.account.clone()
        } else {
            None
        }
    }

    pub async fn snapshot(&self) -> EndpointState {
        self.state.read().await.clone()
    }
}

/// Run an endpoint call under a deadline, mapping expiry to
/// [`EndpointError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> Result<T, EndpointError>
where
    F: Future<Output = Result<T, EndpointError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(EndpointError::Timeout(format!(
            "{what} exceeded {}ms",
            limit.as_millis()
        ))),
    }
}
