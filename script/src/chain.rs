//! JSON-RPC adapters for the compute and settlement chains.

use std::time::Duration;

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, Log, B256, U256, U64},
    providers::{
        DynProvider, PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder,
        WatchTxError,
    },
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::TransportError,
};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use chatnft_lib::chain::{ChainError, ComputeChain, Receipt, SettlementChain};
use chatnft_lib::request::ConfidentialTransaction;
use chatnft_lib::settlement::SettlementTransaction;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

fn connect(rpc_url: &str) -> Result<DynProvider, ChainError> {
    let url = rpc_url
        .parse()
        .map_err(|e| ChainError::Rpc(format!("Invalid RPC URL {rpc_url}: {e}")))?;
    Ok(DynProvider::new(ProviderBuilder::new().connect_http(url)))
}

fn rpc_error(e: TransportError) -> ChainError {
    ChainError::Rpc(e.to_string())
}

fn watch_error(tx_hash: B256, e: PendingTransactionError) -> ChainError {
    match e {
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => ChainError::ReceiptTimeout(tx_hash),
        other => ChainError::Rpc(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Compute chain
// ---------------------------------------------------------------------------

/// Receipt as returned by the compute node. Decoded by hand since its
/// transaction type is not one alloy's Ethereum network knows.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    status: Option<U64>,
    #[serde(default)]
    logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

impl RawReceipt {
    fn into_receipt(self) -> Receipt {
        Receipt {
            tx_hash: self.transaction_hash,
            success: self.status == Some(U64::from(1)),
            logs: self
                .logs
                .into_iter()
                .map(|l| Log::new_unchecked(l.address, l.topics, l.data))
                .collect(),
        }
    }
}

/// Compute chain adapter. Confidential requests go to `eth_sendTransaction`
/// on a signing endpoint; everything else to the public node.
#[derive(Clone)]
pub struct SuaveRpc {
    node: DynProvider,
    signer: DynProvider,
    receipt_timeout: Duration,
}

impl SuaveRpc {
    pub fn new(
        rpc_url: &str,
        signer_url: &str,
        receipt_timeout: Duration,
    ) -> Result<Self, ChainError> {
        Ok(Self { node: connect(rpc_url)?, signer: connect(signer_url)?, receipt_timeout })
    }
}

impl ComputeChain for SuaveRpc {
    async fn submit_confidential(
        &self,
        from: Address,
        tx: &ConfidentialTransaction,
    ) -> Result<B256, ChainError> {
        let request = tx.to_rpc(from);
        debug!(?request, "eth_sendTransaction");
        self.signer
            .raw_request::<_, B256>("eth_sendTransaction".into(), (request,))
            .await
            .map_err(|e| ChainError::Submission(e.to_string()))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let raw: Option<RawReceipt> = self
                .node
                .raw_request("eth_getTransactionReceipt".into(), (tx_hash,))
                .await
                .map_err(rpc_error)?;
            if let Some(raw) = raw {
                return Ok(raw.into_receipt());
            }
            if Instant::now() >= deadline {
                return Err(ChainError::ReceiptTimeout(tx_hash));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        self.node.get_balance(account).await.map_err(rpc_error)
    }
}

// ---------------------------------------------------------------------------
// Settlement chain
// ---------------------------------------------------------------------------

/// Settlement chain adapter. Without a private key it can only read.
#[derive(Clone)]
pub struct SettlementRpc {
    provider: DynProvider,
    receipt_timeout: Duration,
}

impl SettlementRpc {
    pub fn new(
        rpc_url: &str,
        private_key: Option<&str>,
        receipt_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let provider = match private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .parse()
                    .map_err(|e| ChainError::Rpc(format!("Invalid private key: {e}")))?;
                let url = rpc_url
                    .parse()
                    .map_err(|e| ChainError::Rpc(format!("Invalid RPC URL {rpc_url}: {e}")))?;
                DynProvider::new(
                    ProviderBuilder::new().wallet(EthereumWallet::from(signer)).connect_http(url),
                )
            }
            None => connect(rpc_url)?,
        };
        Ok(Self { provider, receipt_timeout })
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider.get_chain_id().await.map_err(rpc_error)
    }

    fn convert_receipt(receipt: &TransactionReceipt) -> Receipt {
        Receipt {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            logs: receipt.inner.logs().iter().map(|l| l.inner.clone()).collect(),
        }
    }
}

impl SettlementChain for SettlementRpc {
    async fn submit(&self, from: Address, tx: &SettlementTransaction) -> Result<B256, ChainError> {
        let gas_price = match tx.gas_price {
            Some(price) => price,
            None => self.provider.get_gas_price().await.map_err(rpc_error)?,
        };
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(tx.to)
            .with_input(tx.calldata())
            .with_gas_limit(tx.gas)
            .with_gas_price(gas_price);

        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| ChainError::Submission(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|e| watch_error(tx_hash, e))?;
        Ok(Self::convert_receipt(&receipt))
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        self.provider.get_balance(account).await.map_err(rpc_error)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default().with_to(to).with_input(data);
        self.provider.call(request).await.map_err(|e| match e.as_error_resp() {
            // JSON-RPC error responses from eth_call are reverts
            Some(payload) => ChainError::Reverted(payload.message.to_string()),
            None => rpc_error(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_receipt_conversion() {
        let json = r#"{
            "transactionHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "status": "0x1",
            "type": "0x50",
            "logs": [{
                "address": "0x00000000000000000000000000000000000000c1",
                "topics": ["0x0202020202020202020202020202020202020202020202020202020202020202"],
                "data": "0x1234",
                "logIndex": "0x0"
            }]
        }"#;
        let receipt = serde_json::from_str::<RawReceipt>(json).unwrap().into_receipt();
        assert_eq!(receipt.tx_hash, B256::repeat_byte(0x01));
        assert!(receipt.success);
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].topics(), &[B256::repeat_byte(0x02)]);
        assert_eq!(receipt.logs[0].data.data, Bytes::from(vec![0x12, 0x34]));
    }

    #[test]
    fn test_raw_receipt_failed_status() {
        let json = r#"{
            "transactionHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "status": "0x0"
        }"#;
        let receipt = serde_json::from_str::<RawReceipt>(json).unwrap().into_receipt();
        assert!(!receipt.success);
        assert!(receipt.logs.is_empty());
    }

    #[test]
    fn test_watch_timeout_maps_to_receipt_timeout() {
        let hash = B256::repeat_byte(0x07);
        assert!(matches!(
            watch_error(hash, PendingTransactionError::TxWatcher(WatchTxError::Timeout)),
            ChainError::ReceiptTimeout(h) if h == hash
        ));
        assert!(matches!(
            watch_error(hash, PendingTransactionError::FailedToRegister),
            ChainError::Rpc(_)
        ));
    }
}
