//! Event log parsing for both legs of a mint.
//!
//! The compute leg must emit `NFTCreated` and `QueryResult`; a receipt missing
//! either is a hard failure. Settlement logs are only decoded for diagnostics.

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use alloy_sol_types::SolEvent;
use tracing::{debug, warn};

use crate::abi::{bytes_result, string_result, IChatNFT, INFTEE};
use crate::chain::Receipt;
use crate::config::ResultEncoding;
use crate::keccak256;
use crate::signature::SIGNATURE_LEN;

pub const NFT_CREATED_SIGNATURE: &str = "NFTCreated(uint256,address,bytes)";
pub const QUERY_RESULT_BYTES_SIGNATURE: &str = "QueryResult(bytes)";
pub const QUERY_RESULT_STRING_SIGNATURE: &str = "QueryResult(string)";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LogError {
    #[error("no {0} log found")]
    MissingLog(&'static str),

    #[error("failed to decode {event} log: {reason}")]
    Decode { event: &'static str, reason: String },

    #[error("NFTCreated signature must be {SIGNATURE_LEN} bytes, got {0}")]
    MalformedSignature(usize),

    #[error("QueryResult bytes are not valid UTF-8")]
    InvalidUtf8,
}

/// Signed output of the confidential computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintResult {
    pub recipient: Address,
    pub signature: Bytes,
    pub token_id: U256,
    /// The LLM output.
    pub query_result: String,
}

/// Decodes compute-chain receipts for one pinned `QueryResult` encoding.
#[derive(Clone, Debug)]
pub struct LogParser {
    encoding: ResultEncoding,
    nft_created_topic: B256,
    query_result_topic: B256,
}

impl LogParser {
    pub fn new(encoding: ResultEncoding) -> Self {
        let query_signature = match encoding {
            ResultEncoding::Bytes => QUERY_RESULT_BYTES_SIGNATURE,
            ResultEncoding::String => QUERY_RESULT_STRING_SIGNATURE,
        };
        Self {
            encoding,
            nft_created_topic: B256::from(keccak256(NFT_CREATED_SIGNATURE.as_bytes())),
            query_result_topic: B256::from(keccak256(query_signature.as_bytes())),
        }
    }

    pub fn encoding(&self) -> ResultEncoding {
        self.encoding
    }

    pub fn nft_created_topic(&self) -> B256 {
        self.nft_created_topic
    }

    pub fn query_result_topic(&self) -> B256 {
        self.query_result_topic
    }

    /// Scan every log; logs matching neither topic are ignored.
    pub fn parse(&self, receipt: &Receipt) -> Result<MintResult, LogError> {
        let mut nft_created = None;
        let mut query_result = None;

        for log in &receipt.logs {
            let Some(topic0) = log.topics().first() else {
                continue;
            };
            if *topic0 == self.nft_created_topic {
                nft_created = Some(decode_nft_created(log)?);
            } else if *topic0 == self.query_result_topic {
                query_result = Some(self.decode_query_result(log)?);
            }
        }

        let created = nft_created.ok_or(LogError::MissingLog("NFTCreated"))?;
        let query_result = query_result.ok_or(LogError::MissingLog("QueryResult"))?;

        if created.signature.len() != SIGNATURE_LEN {
            return Err(LogError::MalformedSignature(created.signature.len()));
        }

        debug!(token_id = %created.tokenId, recipient = %created.recipient, "decoded NFTCreated");
        Ok(MintResult {
            recipient: created.recipient,
            signature: created.signature,
            token_id: created.tokenId,
            query_result,
        })
    }

    fn decode_query_result(&self, log: &Log) -> Result<String, LogError> {
        match self.encoding {
            ResultEncoding::Bytes => {
                let event = bytes_result::QueryResult::decode_log_data(&log.data)
                    .map_err(|e| decode_error("QueryResult", e))?;
                String::from_utf8(event.result.to_vec()).map_err(|_| LogError::InvalidUtf8)
            }
            ResultEncoding::String => {
                let event = string_result::QueryResult::decode_log_data(&log.data)
                    .map_err(|e| decode_error("QueryResult", e))?;
                Ok(event.result)
            }
        }
    }
}

fn decode_nft_created(log: &Log) -> Result<IChatNFT::NFTCreated, LogError> {
    IChatNFT::NFTCreated::decode_log_data(&log.data).map_err(|e| decode_error("NFTCreated", e))
}

fn decode_error(event: &'static str, err: alloy_sol_types::Error) -> LogError {
    LogError::Decode { event, reason: err.to_string() }
}

/// Settlement-side events worth reporting after a successful mint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettlementEvent {
    Transfer { from: Address, to: Address, token_id: U256 },
    Minted { token_id: U256, recipient: Address },
}

/// Best-effort decode of settlement logs. Failures are logged, never returned.
pub fn decode_settlement_logs(receipt: &Receipt) -> Vec<SettlementEvent> {
    let mut events = Vec::new();
    for log in &receipt.logs {
        let Some(topic0) = log.topics().first() else {
            continue;
        };
        if *topic0 == INFTEE::Transfer::SIGNATURE_HASH {
            match INFTEE::Transfer::decode_log_data(&log.data) {
                Ok(e) => events.push(SettlementEvent::Transfer {
                    from: e.from,
                    to: e.to,
                    token_id: e.tokenId,
                }),
                Err(e) => warn!("settlement: Transfer decode error: {e}"),
            }
        } else if *topic0 == INFTEE::NFTMinted::SIGNATURE_HASH {
            match INFTEE::NFTMinted::decode_log_data(&log.data) {
                Ok(e) => events.push(SettlementEvent::Minted {
                    token_id: e.tokenId,
                    recipient: e.recipient,
                }),
                Err(e) => warn!("settlement: NFTMinted decode error: {e}"),
            }
        } else {
            debug!(topic = %topic0, "settlement: ignoring unknown log");
        }
    }
    events
}
