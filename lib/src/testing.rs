//! In-memory chain adapters and receipt fixtures.
//!
//! Receipts are scripted up front; every submission and balance read is
//! counted so tests can assert on what the orchestrator did and did not do.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use alloy_sol_types::SolEvent;
use tokio::sync::Mutex;

use crate::abi::{bytes_result, string_result, IChatNFT, INFTEE};
use crate::chain::{ChainError, ComputeChain, Receipt, SettlementChain};
use crate::config::ResultEncoding;
use crate::request::ConfidentialTransaction;
use crate::settlement::SettlementTransaction;

/// What the next submission on a mock chain resolves to.
#[derive(Clone, Debug)]
pub enum Scripted {
    /// Accepted and mined with this receipt.
    Mined(Receipt),
    /// Rejected at submission time.
    Rejected(String),
    /// Accepted, but no receipt ever shows up.
    Lost(B256),
}

#[derive(Default)]
struct Ledger {
    script: Mutex<VecDeque<Scripted>>,
    receipts: Mutex<HashMap<B256, Option<Receipt>>>,
    balance: Mutex<U256>,
    submits: AtomicUsize,
    balance_calls: AtomicUsize,
}

impl Ledger {
    async fn submit(&self) -> Result<B256, ChainError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().await.pop_front();
        match next {
            Some(Scripted::Mined(receipt)) => {
                let hash = receipt.tx_hash;
                self.receipts.lock().await.insert(hash, Some(receipt));
                Ok(hash)
            }
            Some(Scripted::Lost(hash)) => {
                self.receipts.lock().await.insert(hash, None);
                Ok(hash)
            }
            Some(Scripted::Rejected(reason)) => Err(ChainError::Submission(reason)),
            None => Err(ChainError::Submission("no outcome scripted".into())),
        }
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError> {
        match self.receipts.lock().await.get(&tx_hash) {
            Some(Some(receipt)) => Ok(receipt.clone()),
            _ => Err(ChainError::ReceiptTimeout(tx_hash)),
        }
    }

    async fn balance(&self) -> U256 {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        *self.balance.lock().await
    }
}

pub struct MockComputeChain {
    ledger: Ledger,
    submitted: Mutex<Vec<(Address, ConfidentialTransaction)>>,
}

impl MockComputeChain {
    pub fn new() -> Self {
        Self { ledger: Ledger::default(), submitted: Mutex::new(Vec::new()) }
    }

    pub async fn script(&self, outcome: Scripted) {
        self.ledger.script.lock().await.push_back(outcome);
    }

    pub async fn set_balance(&self, balance: U256) {
        *self.ledger.balance.lock().await = balance;
    }

    pub fn submit_count(&self) -> usize {
        self.ledger.submits.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.ledger.balance_calls.load(Ordering::SeqCst)
    }

    pub async fn submitted(&self) -> Vec<(Address, ConfidentialTransaction)> {
        self.submitted.lock().await.clone()
    }
}

impl Default for MockComputeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeChain for MockComputeChain {
    async fn submit_confidential(
        &self,
        from: Address,
        tx: &ConfidentialTransaction,
    ) -> Result<B256, ChainError> {
        self.submitted.lock().await.push((from, tx.clone()));
        self.ledger.submit().await
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError> {
        self.ledger.receipt(tx_hash).await
    }

    async fn balance(&self, _account: Address) -> Result<U256, ChainError> {
        Ok(self.ledger.balance().await)
    }
}

pub struct MockSettlementChain {
    ledger: Ledger,
    submitted: Mutex<Vec<(Address, SettlementTransaction)>>,
    responses: Mutex<HashMap<Bytes, Bytes>>,
}

impl MockSettlementChain {
    pub fn new() -> Self {
        Self {
            ledger: Ledger::default(),
            submitted: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
        }
    }

    pub async fn script(&self, outcome: Scripted) {
        self.ledger.script.lock().await.push_back(outcome);
    }

    pub async fn set_balance(&self, balance: U256) {
        *self.ledger.balance.lock().await = balance;
    }

    /// Answer `eth_call` with `calldata` by returning `response`.
    pub async fn respond_to(&self, calldata: Bytes, response: Bytes) {
        self.responses.lock().await.insert(calldata, response);
    }

    pub fn submit_count(&self) -> usize {
        self.ledger.submits.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.ledger.balance_calls.load(Ordering::SeqCst)
    }

    pub async fn submitted(&self) -> Vec<(Address, SettlementTransaction)> {
        self.submitted.lock().await.clone()
    }
}

impl Default for MockSettlementChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SettlementChain for MockSettlementChain {
    async fn submit(&self, from: Address, tx: &SettlementTransaction) -> Result<B256, ChainError> {
        self.submitted.lock().await.push((from, tx.clone()));
        self.ledger.submit().await
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError> {
        self.ledger.receipt(tx_hash).await
    }

    async fn balance(&self, _account: Address) -> Result<U256, ChainError> {
        Ok(self.ledger.balance().await)
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.responses
            .lock()
            .await
            .get(&data)
            .cloned()
            .ok_or_else(|| ChainError::Reverted("execution reverted".into()))
    }
}

// ---- Fixtures ----

pub fn nft_created_log(contract: Address, token_id: U256, recipient: Address, signature: Bytes) -> Log {
    let event = IChatNFT::NFTCreated { tokenId: token_id, recipient, signature };
    Log { address: contract, data: event.encode_log_data() }
}

pub fn query_result_log(contract: Address, encoding: ResultEncoding, text: &str) -> Log {
    let data = match encoding {
        ResultEncoding::Bytes => {
            bytes_result::QueryResult { result: Bytes::copy_from_slice(text.as_bytes()) }
                .encode_log_data()
        }
        ResultEncoding::String => {
            string_result::QueryResult { result: text.to_string() }.encode_log_data()
        }
    };
    Log { address: contract, data }
}

pub fn transfer_log(contract: Address, to: Address, token_id: U256) -> Log {
    let event = INFTEE::Transfer { from: Address::ZERO, to, tokenId: token_id };
    Log { address: contract, data: event.encode_log_data() }
}

pub fn receipt(tx_hash: B256, success: bool, logs: Vec<Log>) -> Receipt {
    Receipt { tx_hash, success, logs }
}
