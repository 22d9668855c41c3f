//! Confidential request builder.
//!
//! Turns a mint request into the confidential-compute transaction sent to the
//! kettle: ABI-tuple confidential inputs plus the public `mintNFT()` call.

use std::fmt;

use alloy_primitives::{Address, Bytes, U128, U64, U8};
use alloy_sol_types::{SolCall, SolValue};
use serde::Serialize;

use crate::abi::{IChatNFT, MintNFTConfidentialParams, MintNFTKeyedConfidentialParams};
use crate::config::{ComputeChainConfig, PayloadSchema};

/// Transaction type tag of a confidential compute request.
pub const CONFIDENTIAL_TX_TYPE: u8 = 0x43;

pub const DEFAULT_PROMPT: &str =
    "Render a cat in ASCII art. Return only the raw result with no formatting or explanation.";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid recipient address '{0}'")]
    InvalidRecipient(String),

    #[error("at least one prompt is required")]
    EmptyPrompts,

    #[error("payload schema requires a minter key and an API key")]
    MissingCredentials,
}

/// Escape the characters that would let a prompt inject markup when the NFT
/// is later rendered.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Signing key and LLM credential embedded by older protocol revisions.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Hex without the `0x` prefix; the kettle expects a bare string.
    minter_key: String,
    api_key: String,
}

impl Credentials {
    pub fn new(minter_key: &str, api_key: &str) -> Self {
        let minter_key = minter_key
            .strip_prefix("0x")
            .unwrap_or(minter_key)
            .to_string();
        Self { minter_key, api_key: api_key.to_string() }
    }

    pub fn minter_key(&self) -> &str {
        &self.minter_key
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("minter_key", &"<redacted>")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// One mint attempt's input. Prompts are stored already escaped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintRequest {
    recipient: Address,
    prompts: Vec<String>,
    credentials: Option<Credentials>,
}

impl MintRequest {
    pub fn new<I, S>(
        recipient: Address,
        prompts: I,
        credentials: Option<Credentials>,
    ) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prompts: Vec<String> = prompts.into_iter().map(|p| escape_html(p.as_ref())).collect();
        if prompts.is_empty() {
            return Err(RequestError::EmptyPrompts);
        }
        Ok(Self { recipient, prompts, credentials })
    }

    /// Like [`MintRequest::new`], for a recipient that still needs validating.
    pub fn parse<I, S>(
        recipient: &str,
        prompts: I,
        credentials: Option<Credentials>,
    ) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let address: Address = recipient
            .trim()
            .parse()
            .map_err(|_| RequestError::InvalidRecipient(recipient.to_string()))?;
        Self::new(address, prompts, credentials)
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// ABI-encode the confidential payload tuple for the given schema.
    pub fn confidential_inputs(&self, schema: PayloadSchema) -> Result<Bytes, RequestError> {
        let encoded = match schema {
            PayloadSchema::Minimal => MintNFTConfidentialParams {
                recipient: self.recipient,
                prompts: self.prompts.clone(),
            }
            .abi_encode(),
            PayloadSchema::WithCredentials => {
                let credentials = self
                    .credentials
                    .as_ref()
                    .ok_or(RequestError::MissingCredentials)?;
                MintNFTKeyedConfidentialParams {
                    privateKey: credentials.minter_key.clone(),
                    recipient: self.recipient,
                    prompts: self.prompts.clone(),
                    openaiApiKey: credentials.api_key.clone(),
                }
                .abi_encode()
            }
        };
        Ok(Bytes::from(encoded))
    }
}

/// A confidential compute request addressed to a kettle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfidentialTransaction {
    pub to: Address,
    pub confidential_inputs: Bytes,
    pub kettle_address: Address,
    pub data: Bytes,
    pub gas: u64,
    pub gas_price: u128,
    pub tx_type: u8,
}

/// JSON-RPC form of a [`ConfidentialTransaction`] for `eth_sendTransaction`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidentialRpcRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub gas: U64,
    pub gas_price: U128,
    #[serde(rename = "type")]
    pub tx_type: U8,
    pub kettle_address: Address,
    pub confidential_inputs: Bytes,
}

impl ConfidentialTransaction {
    pub fn to_rpc(&self, from: Address) -> ConfidentialRpcRequest {
        ConfidentialRpcRequest {
            from,
            to: self.to,
            data: self.data.clone(),
            gas: U64::from(self.gas),
            gas_price: U128::from(self.gas_price),
            tx_type: U8::from(self.tx_type),
            kettle_address: self.kettle_address,
            confidential_inputs: self.confidential_inputs.clone(),
        }
    }
}

/// Builds confidential requests for one deployment. No I/O.
#[derive(Clone, Debug)]
pub struct ConfidentialRequestBuilder {
    contract: Address,
    kettle: Address,
    gas: u64,
    gas_price: u128,
    schema: PayloadSchema,
}

impl ConfidentialRequestBuilder {
    pub fn new(compute: &ComputeChainConfig, schema: PayloadSchema) -> Self {
        Self {
            contract: compute.contract,
            kettle: compute.kettle,
            gas: compute.gas,
            gas_price: compute.gas_price,
            schema,
        }
    }

    pub fn schema(&self) -> PayloadSchema {
        self.schema
    }

    pub fn build(&self, request: &MintRequest) -> Result<ConfidentialTransaction, RequestError> {
        Ok(ConfidentialTransaction {
            to: self.contract,
            confidential_inputs: request.confidential_inputs(self.schema)?,
            kettle_address: self.kettle,
            data: Bytes::from(IChatNFT::mintNFTCall {}.abi_encode()),
            gas: self.gas,
            gas_price: self.gas_price,
            tx_type: CONFIDENTIAL_TX_TYPE,
        })
    }
}
