//! Contract bindings (inline, no ABI files needed).
//!
//! The confidential payload and the `QueryResult` event changed shape across
//! protocol revisions. Each shape gets its own binding so a deployment pins
//! exactly one of them.

use alloy_sol_types::sol;

sol! {
    /// Payload for deployments where the kettle derives signing material itself.
    struct MintNFTConfidentialParams {
        address recipient;
        string[] prompts;
    }

    /// Payload for deployments where the caller ships the minter key and the
    /// LLM credential inside the confidential inputs.
    struct MintNFTKeyedConfidentialParams {
        string privateKey;
        address recipient;
        string[] prompts;
        string openaiApiKey;
    }

    interface IChatNFT {
        function mintNFT() external;

        event NFTCreated(uint256 tokenId, address recipient, bytes signature);
    }

    interface INFTEE {
        function mintNFTWithSignature(uint256 tokenId, string content, uint8 v, bytes32 r, bytes32 s) external;
        function tokenURI(uint256 tokenId) external view returns (string);
        function tokenData(uint256 tokenId) external view returns (string);
        function ownerOf(uint256 tokenId) external view returns (address);

        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
        event NFTMinted(uint256 indexed tokenId, address indexed recipient);
    }
}

/// `QueryResult` as emitted by revisions that return raw bytes.
pub mod bytes_result {
    use alloy_sol_types::sol;

    sol! {
        event QueryResult(bytes result);
    }
}

/// `QueryResult` as emitted by revisions that return a string.
pub mod string_result {
    use alloy_sol_types::sol;

    sol! {
        event QueryResult(string result);
    }
}
