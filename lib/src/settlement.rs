//! Settlement transaction builder and NFT read calls.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

use crate::abi::INFTEE;
use crate::config::SettlementChainConfig;
use crate::logs::MintResult;
use crate::signature::{SignatureError, SplitSignature};

/// `mintNFTWithSignature` call on the settlement chain, built once from a
/// confirmed compute result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlementTransaction {
    pub to: Address,
    pub token_id: U256,
    pub content: String,
    pub signature: SplitSignature,
    pub gas: u64,
    /// `None` asks the chain adapter for the node's current price.
    pub gas_price: Option<u128>,
}

impl SettlementTransaction {
    pub fn from_result(
        result: &MintResult,
        settlement: &SettlementChainConfig,
    ) -> Result<Self, SignatureError> {
        let signature = SplitSignature::from_bytes(&result.signature)?;
        Ok(Self {
            to: settlement.nft_contract,
            token_id: result.token_id,
            content: result.query_result.clone(),
            signature,
            gas: settlement.gas,
            gas_price: settlement.gas_price,
        })
    }

    /// Call arguments in contract order: (tokenId, content, v, r, s).
    pub fn call(&self) -> INFTEE::mintNFTWithSignatureCall {
        INFTEE::mintNFTWithSignatureCall {
            tokenId: self.token_id,
            content: self.content.clone(),
            v: self.signature.v,
            r: self.signature.r,
            s: self.signature.s,
        }
    }

    pub fn calldata(&self) -> Bytes {
        Bytes::from(self.call().abi_encode())
    }
}

pub fn token_data_call(token_id: U256) -> Bytes {
    Bytes::from(INFTEE::tokenDataCall { tokenId: token_id }.abi_encode())
}

pub fn token_uri_call(token_id: U256) -> Bytes {
    Bytes::from(INFTEE::tokenURICall { tokenId: token_id }.abi_encode())
}

pub fn owner_of_call(token_id: U256) -> Bytes {
    Bytes::from(INFTEE::ownerOfCall { tokenId: token_id }.abi_encode())
}

pub fn decode_string_return(data: &[u8]) -> Result<String, alloy_sol_types::Error> {
    INFTEE::tokenDataCall::abi_decode_returns(data)
}

pub fn decode_address_return(data: &[u8]) -> Result<Address, alloy_sol_types::Error> {
    INFTEE::ownerOfCall::abi_decode_returns(data)
}

/// Undo the escaping applied to stored content and split it into lines.
pub fn render_content(content: &str) -> Vec<String> {
    content
        .replace("\\\\", "\\")
        .replace("\\n", "\n")
        .split('\n')
        .map(str::to_string)
        .collect()
}
