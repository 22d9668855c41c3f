//! Wallet endpoint speaking the EIP-1193 request methods over JSON-RPC.

use std::borrow::Cow;

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use serde_json::Value;

use chatnft_lib::balance::{WalletError, WalletRpc};

/// JSON-RPC "internal error" code, used for transport failures.
const INTERNAL_ERROR: i64 = -32603;

#[derive(Clone)]
pub struct WalletEndpoint {
    provider: DynProvider,
}

impl WalletEndpoint {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(url.parse()?));
        Ok(Self { provider })
    }

    /// Chain id the wallet is currently on.
    pub async fn chain_id(&self) -> Result<u64, WalletError> {
        let value = self.request("eth_chainId", Value::Array(vec![])).await?;
        let hex = value.as_str().unwrap_or_default();
        u64::from_str_radix(hex.trim_start_matches("0x"), 16).map_err(|e| WalletError {
            code: INTERNAL_ERROR,
            message: format!("bad eth_chainId response {value}: {e}"),
        })
    }
}

impl WalletRpc for WalletEndpoint {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        self.provider
            .raw_request::<_, Value>(Cow::Owned(method.to_string()), params)
            .await
            .map_err(|e| match e.as_error_resp() {
                Some(payload) => WalletError {
                    code: payload.code,
                    message: payload.message.to_string(),
                },
                None => WalletError { code: INTERNAL_ERROR, message: e.to_string() },
            })
    }
}
