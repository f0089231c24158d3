//! Nullable ledger endpoint: an in-memory vote contract.

use std::sync::Mutex;

use tally_endpoint::{validate_contract_address, EndpointError, LedgerEndpoint, TxReceipt};
use tally_types::{BallotId, VoterId, WireVote};

/// Account reported by every `NullEndpoint` unless overridden.
pub const DEFAULT_ACCOUNT: &str = "0x00000000000000000000000000000000000000a1";

struct Inner {
    online: bool,
    accounts: Vec<String>,
    contract_deployed: bool,
    contract: Option<String>,
    votes: Vec<WireVote>,
    submissions: u64,
    reject_writes: bool,
    fail_listing: bool,
    height: u64,
}

/// A test endpoint that keeps its contract state in memory.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullEndpoint {
    name: String,
    url: String,
    inner: Mutex<Inner>,
}

impl NullEndpoint {
    /// An online endpoint with one account and a deployed contract.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            url: format!("null://{name}"),
            name,
            inner: Mutex::new(Inner {
                online: true,
                accounts: vec![DEFAULT_ACCOUNT.to_string()],
                contract_deployed: true,
                contract: None,
                votes: Vec::new(),
                submissions: 0,
                reject_writes: false,
                fail_listing: false,
                height: 0,
            }),
        }
    }

    /// Take the endpoint off the network or bring it back.
    pub fn set_online(&self, online: bool) {
        self.inner.lock().unwrap().online = online;
    }

    pub fn is_online(&self) -> bool {
        self.inner.lock().unwrap().online
    }

    pub fn set_accounts(&self, accounts: Vec<String>) {
        self.inner.lock().unwrap().accounts = accounts;
    }

    /// Simulate a node with no bytecode at any address.
    pub fn set_contract_deployed(&self, deployed: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.contract_deployed = deployed;
        if !deployed {
            inner.contract = None;
        }
    }

    /// Make every write fail with [`EndpointError::Rejected`].
    pub fn set_reject_writes(&self, reject: bool) {
        self.inner.lock().unwrap().reject_writes = reject;
    }

    /// Make `get_all_votes` fail while counts and lookups keep working.
    pub fn set_fail_listing(&self, fail: bool) {
        self.inner.lock().unwrap().fail_listing = fail;
    }

    /// Seed votes without counting them as submissions.
    pub fn preload(&self, votes: impl IntoIterator<Item = WireVote>) {
        self.inner.lock().unwrap().votes.extend(votes);
    }

    pub fn total(&self) -> usize {
        self.inner.lock().unwrap().votes.len()
    }

    pub fn ballots(&self) -> Vec<BallotId> {
        self.inner
            .lock()
            .unwrap()
            .votes
            .iter()
            .map(|v| v.ballot_id.clone())
            .collect()
    }

    /// Accepted `submit_vote` calls since creation.
    pub fn submissions(&self) -> u64 {
        self.inner.lock().unwrap().submissions
    }

    fn online(&self) -> Result<std::sync::MutexGuard<'_, Inner>, EndpointError> {
        let inner = self.inner.lock().unwrap();
        if !inner.online {
            return Err(EndpointError::Unreachable(format!(
                "{}: connection refused",
                self.name
            )));
        }
        Ok(inner)
    }

    fn bound(&self) -> Result<std::sync::MutexGuard<'_, Inner>, EndpointError> {
        let inner = self.online()?;
        if inner.contract.is_none() {
            return Err(EndpointError::NoContract(format!(
                "{}: no contract bound",
                self.name
            )));
        }
        Ok(inner)
    }
}

impl LedgerEndpoint for NullEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn is_listening(&self) -> Result<bool, EndpointError> {
        self.online().map(|_| true)
    }

    async fn accounts(&self) -> Result<Vec<String>, EndpointError> {
        Ok(self.online()?.accounts.clone())
    }

    async fn block_height(&self) -> Result<u64, EndpointError> {
        Ok(self.online()?.height)
    }

    async fn bind_contract(&self, address: &str) -> Result<(), EndpointError> {
        validate_contract_address(address)?;
        let mut inner = self.online()?;
        if !inner.contract_deployed {
            return Err(EndpointError::NoContract(address.to_string()));
        }
        inner.contract = Some(address.to_string());
        Ok(())
    }

    async fn submit_vote(&self, _from: &str, vote: &WireVote) -> Result<TxReceipt, EndpointError> {
        let mut inner = self.bound()?;
        if inner.reject_writes {
            return Err(EndpointError::Rejected("execution reverted".into()));
        }
        if inner.votes.iter().any(|v| v.ballot_id == vote.ballot_id) {
            return Err(EndpointError::AlreadyExists(format!(
                "vote exists: {}",
                vote.ballot_id
            )));
        }
        if inner.votes.iter().any(|v| v.voter_id == vote.voter_id) {
            return Err(EndpointError::AlreadyExists(format!(
                "already voted: {}",
                vote.voter_id
            )));
        }
        inner.votes.push(vote.clone());
        inner.submissions += 1;
        inner.height += 1;
        Ok(TxReceipt {
            tx_ref: format!("{}-tx-{}", self.name, inner.submissions),
            block_height: Some(inner.height),
        })
    }

    async fn vote_exists(&self, ballot: &BallotId) -> Result<bool, EndpointError> {
        Ok(self.bound()?.votes.iter().any(|v| &v.ballot_id == ballot))
    }

    async fn get_vote(&self, ballot: &BallotId) -> Result<WireVote, EndpointError> {
        self.bound()?
            .votes
            .iter()
            .find(|v| &v.ballot_id == ballot)
            .cloned()
            .ok_or_else(|| EndpointError::Rejected(format!("unknown ballot {ballot}")))
    }

    async fn get_all_votes(&self) -> Result<Vec<BallotId>, EndpointError> {
        let inner = self.bound()?;
        if inner.fail_listing {
            return Err(EndpointError::InvalidResponse("vote listing unavailable".into()));
        }
        Ok(inner
            .votes
            .iter()
            .map(|v| v.ballot_id.clone())
            .collect())
    }

    async fn get_total_votes(&self) -> Result<u64, EndpointError> {
        Ok(self.bound()?.votes.len() as u64)
    }

    async fn has_voted(&self, voter: &VoterId) -> Result<bool, EndpointError> {
        Ok(self.bound()?.votes.iter().any(|v| &v.voter_id == voter))
    }

    async fn reset_votes(&self, _from: &str) -> Result<(), EndpointError> {
        let mut inner = self.bound()?;
        if inner.reject_writes {
            return Err(EndpointError::Rejected("execution reverted".into()));
        }
        inner.votes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn wire(voter: &str, ballot: &str) -> WireVote {
        WireVote {
            voter_id: VoterId::parse(voter).unwrap(),
            ballot_id: BallotId::parse(ballot).unwrap(),
            votes_payload: "[]".into(),
            timestamp_secs: 1,
            voter_hash: "h".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_ballot_or_voter_is_already_exists() {
        let endpoint = NullEndpoint::new("primary");
        endpoint.bind_contract(CONTRACT).await.unwrap();
        endpoint.submit_vote(DEFAULT_ACCOUNT, &wire("V1", "B1")).await.unwrap();

        let again = endpoint.submit_vote(DEFAULT_ACCOUNT, &wire("V1", "B1")).await;
        assert!(again.unwrap_err().is_already_exists());
        let second_ballot = endpoint.submit_vote(DEFAULT_ACCOUNT, &wire("V1", "B2")).await;
        assert!(second_ballot.unwrap_err().is_already_exists());
        assert_eq!(endpoint.submissions(), 1);
    }

    #[tokio::test]
    async fn offline_endpoint_is_unreachable() {
        let endpoint = NullEndpoint::new("secondary");
        endpoint.set_online(false);
        assert!(endpoint.is_listening().await.is_err());
        endpoint.set_online(true);
        assert!(endpoint.is_listening().await.unwrap());
    }

    #[tokio::test]
    async fn missing_bytecode_blocks_binding() {
        let endpoint = NullEndpoint::new("primary");
        endpoint.set_contract_deployed(false);
        assert!(matches!(
            endpoint.bind_contract(CONTRACT).await,
            Err(EndpointError::NoContract(_))
        ));
        assert!(matches!(
            endpoint.get_total_votes().await,
            Err(EndpointError::NoContract(_))
        ));
    }
}
