#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use alloy_primitives::{address, Address, Bytes, B256, U256};
    use alloy_sol_types::{SolCall, SolValue};
    use chatnft_lib::abi::INFTEE;
    use chatnft_lib::balance::{DEFAULT_COMPUTE_THRESHOLD, DEFAULT_SETTLEMENT_THRESHOLD};
    use chatnft_lib::cache::{KeyValueStore, CACHE_KEY};
    use chatnft_lib::config::{
        ComputeChainConfig, SettlementChainConfig, DEFAULT_KETTLE_ADDRESS,
    };
    use chatnft_lib::testing::*;
    use chatnft_lib::*;

    const ACCOUNT: Address = address!("0000000000000000000000000000000000000abc");
    const CHATNFT: Address = address!("00000000000000000000000000000000000000c1");
    const NFTEE: Address = address!("00000000000000000000000000000000000000e1");
    const L1_CHAIN_ID: u64 = 11155111;

    fn deployment(protocol: ProtocolConfig) -> DeploymentConfig {
        DeploymentConfig {
            compute: ComputeChainConfig {
                rpc_url: "http://localhost:8545".into(),
                contract: CHATNFT,
                kettle: DEFAULT_KETTLE_ADDRESS,
                explorer_url: "https://explorer.toliman.suave.flashbots.net".into(),
                faucet_url: Some("https://faucet.toliman.suave.flashbots.net/".into()),
                gas: 5_000_000,
                gas_price: 10_000_000_000,
            },
            settlement: SettlementChainConfig {
                rpc_url: "http://localhost:8546".into(),
                chain_id: L1_CHAIN_ID,
                chain_name: "Sepolia".into(),
                nft_contract: NFTEE,
                explorer_url: "https://sepolia.etherscan.io".into(),
                faucet_url: None,
                gas: 900_000,
                gas_price: Some(96_000_000_000),
            },
            protocol,
            thresholds: Thresholds::default(),
            poll_interval: Duration::from_secs(30),
            receipt_timeout: Duration::from_secs(5),
        }
    }

    fn session() -> Session {
        Session { account: ACCOUNT, connected_chain_id: L1_CHAIN_ID }
    }

    /// r = 0x11.., s = 0x22.., compact v = 1
    fn known_signature() -> Bytes {
        let mut sig = vec![0x11u8; 32];
        sig.extend_from_slice(&[0x22u8; 32]);
        sig.push(1);
        Bytes::from(sig)
    }

    fn compute_receipt(token_id: u64, encoding: ResultEncoding, text: &str) -> Scripted {
        Scripted::Mined(receipt(
            B256::with_last_byte(token_id as u8),
            true,
            vec![
                nft_created_log(CHATNFT, U256::from(token_id), ACCOUNT, known_signature()),
                query_result_log(CHATNFT, encoding, text),
            ],
        ))
    }

    fn settlement_receipt(token_id: u64) -> Scripted {
        Scripted::Mined(receipt(
            B256::repeat_byte(0xee),
            true,
            vec![transfer_log(NFTEE, ACCOUNT, U256::from(token_id))],
        ))
    }

    struct Harness {
        compute: Arc<MockComputeChain>,
        settlement: Arc<MockSettlementChain>,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        async fn funded() -> Self {
            let h = Harness {
                compute: Arc::new(MockComputeChain::new()),
                settlement: Arc::new(MockSettlementChain::new()),
                store: Arc::new(MemoryStore::new()),
            };
            h.compute.set_balance(U256::from(DEFAULT_COMPUTE_THRESHOLD * 10)).await;
            h.settlement.set_balance(U256::from(DEFAULT_SETTLEMENT_THRESHOLD * 10)).await;
            h
        }

        fn orchestrator(
            &self,
            protocol: ProtocolConfig,
        ) -> Orchestrator<MockComputeChain, MockSettlementChain, Arc<MemoryStore>> {
            let cache = NftCache::load(self.store.clone()).unwrap();
            Orchestrator::new(
                self.compute.clone(),
                self.settlement.clone(),
                deployment(protocol),
                cache,
            )
        }
    }

    #[tokio::test]
    async fn test_draw_a_cat_end_to_end() {
        let h = Harness::funded().await;
        h.compute.script(compute_receipt(7, ResultEncoding::Bytes, "cat ascii")).await;
        h.settlement.script(settlement_receipt(7)).await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default());

        let minted = orchestrator.mint(Some(&session()), ["draw a cat"]).await.unwrap();
        assert_eq!(minted.result.token_id, U256::from(7));
        assert_eq!(minted.result.recipient, ACCOUNT);

        let expected = SplitSignature::from_bytes(&known_signature()).unwrap();
        assert_eq!(expected.v, 28);

        let settlement = orchestrator
            .history()
            .iter()
            .find_map(|s| match s {
                MintState::AwaitingSettlementReceipt { settlement, .. } => Some(settlement.clone()),
                _ => None,
            })
            .expect("never reached AwaitingSettlementReceipt");
        let call = INFTEE::mintNFTWithSignatureCall::abi_decode(&settlement.calldata()).unwrap();
        assert_eq!(call.tokenId, U256::from(7));
        assert_eq!(call.content, "cat ascii");
        assert_eq!(call.v, expected.v);
        assert_eq!(call.r, expected.r);
        assert_eq!(call.s, expected.s);
        assert_eq!(settlement.to, NFTEE);
        assert_eq!(settlement.gas, 900_000);
        assert_eq!(settlement.gas_price, Some(96_000_000_000));

        let submitted = h.compute.submitted().await;
        assert_eq!(submitted.len(), 1);
        let ccr = &submitted[0].1;
        assert_eq!(ccr.to, CHATNFT);
        assert_eq!(ccr.kettle_address, DEFAULT_KETTLE_ADDRESS);
        assert_eq!(ccr.tx_type, 0x43);
        let (recipient, prompts) =
            <(Address, Vec<String>)>::abi_decode(&ccr.confidential_inputs).unwrap();
        assert_eq!(recipient, ACCOUNT);
        assert_eq!(prompts, vec!["draw a cat".to_string()]);
    }

    #[tokio::test]
    async fn test_reverted_compute_receipt_never_settles() {
        let h = Harness::funded().await;
        h.compute.script(compute_receipt(1, ResultEncoding::Bytes, "first")).await;
        h.settlement.script(settlement_receipt(1)).await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default());
        orchestrator.mint(Some(&session()), ["first"]).await.unwrap();
        let persisted = h.store.get(CACHE_KEY).unwrap();

        h.compute
            .script(Scripted::Mined(receipt(B256::repeat_byte(0x0f), false, vec![])))
            .await;
        let err = orchestrator.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        assert!(matches!(err, MintError::UpstreamRejected(_)));
        let names: Vec<_> = orchestrator.history().iter().map(MintState::name).collect();
        assert_eq!(names, vec!["Idle", "AwaitingConfidentialReceipt", "Failed"]);
        assert_eq!(h.settlement.submit_count(), 1);
        assert_eq!(orchestrator.cache().len(), 1);
        assert_eq!(h.store.get(CACHE_KEY).unwrap(), persisted);
    }

    #[tokio::test]
    async fn test_partial_logs_never_settle() {
        let h = Harness::funded().await;
        h.compute
            .script(Scripted::Mined(receipt(
                B256::repeat_byte(0x01),
                true,
                vec![query_result_log(CHATNFT, ResultEncoding::Bytes, "cat ascii")],
            )))
            .await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default());

        let err = orchestrator.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        assert!(matches!(err, MintError::Logs(_)));
        assert_eq!(h.settlement.submit_count(), 0);
        assert!(h.settlement.submitted().await.is_empty());
        assert!(orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_result_encoding_is_pinned_per_deployment() {
        let h = Harness::funded().await;
        // compute side emits the string-shaped event, deployment expects bytes
        h.compute.script(compute_receipt(3, ResultEncoding::String, "dog ascii")).await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default());

        let err = orchestrator.mint(Some(&session()), ["draw a dog"]).await.unwrap_err();
        assert!(matches!(err, MintError::Logs(_)));
        assert_eq!(h.settlement.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_credentials_protocol_revision() {
        let h = Harness::funded().await;
        h.compute.script(compute_receipt(5, ResultEncoding::String, "dog ascii")).await;
        h.settlement.script(settlement_receipt(5)).await;
        let protocol = ProtocolConfig {
            payload: PayloadSchema::WithCredentials,
            result: ResultEncoding::String,
        };
        let mut orchestrator = h
            .orchestrator(protocol)
            .with_credentials(Credentials::new("0xdeadbeef", "sk-test"));

        let minted = orchestrator.mint(Some(&session()), ["draw a dog"]).await.unwrap();
        assert_eq!(minted.result.query_result, "dog ascii");

        let submitted = h.compute.submitted().await;
        let (key, recipient, prompts, api_key) =
            <(String, Address, Vec<String>, String)>::abi_decode(&submitted[0].1.confidential_inputs)
                .unwrap();
        assert_eq!(key, "deadbeef");
        assert_eq!(recipient, ACCOUNT);
        assert_eq!(prompts, vec!["draw a dog".to_string()]);
        assert_eq!(api_key, "sk-test");
    }

    #[tokio::test]
    async fn test_balance_at_threshold_blocks_mint() {
        let h = Harness::funded().await;
        h.settlement.set_balance(U256::from(DEFAULT_SETTLEMENT_THRESHOLD)).await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default());

        let err = orchestrator.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        assert!(matches!(err, MintError::InsufficientFunds { chain: ChainKind::Settlement, .. }));
        assert_eq!(orchestrator.gate().verdict(), GateVerdict::Insufficient(ChainKind::Settlement));
        assert_eq!(orchestrator.state(), &MintState::Idle);
        assert_eq!(h.compute.submit_count(), 0);

        // one wei more opens the gate
        h.settlement.set_balance(U256::from(DEFAULT_SETTLEMENT_THRESHOLD + 1)).await;
        h.compute.script(compute_receipt(7, ResultEncoding::Bytes, "cat ascii")).await;
        h.settlement.script(settlement_receipt(7)).await;
        orchestrator.mint(Some(&session()), ["draw a cat"]).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_gate_skips_refetch_once_funded() {
        let h = Harness::funded().await;
        let gate = Arc::new(BalanceGate::new(Thresholds::default()));
        let poller = gate.start_polling(
            h.compute.clone(),
            h.settlement.clone(),
            ACCOUNT,
            Duration::from_secs(30),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(gate.verdict(), GateVerdict::Ready);

        h.compute.script(compute_receipt(7, ResultEncoding::Bytes, "cat ascii")).await;
        h.settlement.script(settlement_receipt(7)).await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default()).with_gate(gate.clone());
        orchestrator.mint(Some(&session()), ["draw a cat"]).await.unwrap();

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(h.compute.balance_calls(), 1);
        assert_eq!(h.settlement.balance_calls(), 1);
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_cache_survives_reload() {
        let h = Harness::funded().await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default());
        for id in [1u64, 2, 255] {
            h.compute.script(compute_receipt(id, ResultEncoding::Bytes, &format!("art {id}"))).await;
            h.settlement.script(settlement_receipt(id)).await;
            orchestrator.mint(Some(&session()), ["draw"]).await.unwrap();
        }

        let json = h.store.get(CACHE_KEY).unwrap().unwrap();
        let raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(raw[2]["tokenId"], "0xff");

        // rewrite ids in upper case, as another client might
        h.store.set(CACHE_KEY, &json.replace("0xff", "0xFF")).unwrap();
        let reloaded = NftCache::load(h.store.clone()).unwrap();
        let ids: Vec<_> = reloaded.entries().iter().map(|n| n.token_id).collect();
        assert_eq!(ids, vec![U256::from(1), U256::from(2), U256::from(255)]);
        assert_eq!(reloaded.find(U256::from(255)).unwrap().query_result, "art 255");
    }

    #[tokio::test]
    async fn test_settlement_failure_then_manual_retry() {
        let h = Harness::funded().await;
        h.compute.script(compute_receipt(9, ResultEncoding::Bytes, "cat ascii")).await;
        h.settlement
            .script(Scripted::Mined(receipt(B256::repeat_byte(0xee), false, vec![])))
            .await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default());

        let err = orchestrator.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();
        assert!(matches!(err, MintError::SettlementRejected(_)));

        // the compute result survives a restart
        let mut restarted = h.orchestrator(ProtocolConfig::default());
        let pending = restarted.unsettled().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].token_id, U256::from(9));

        h.settlement.script(settlement_receipt(9)).await;
        let minted = restarted.settle_cached(Some(&session()), &pending[0]).await.unwrap();
        assert_eq!(minted.result.query_result, "cat ascii");
        assert_eq!(h.compute.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_render_after_mint() {
        let h = Harness::funded().await;
        h.compute.script(compute_receipt(7, ResultEncoding::Bytes, " /\\_/\\\\n( o.o )")).await;
        h.settlement.script(settlement_receipt(7)).await;
        let mut orchestrator = h.orchestrator(ProtocolConfig::default());
        let minted = orchestrator.mint(Some(&session()), ["draw a cat"]).await.unwrap();

        let token_data = INFTEE::tokenDataCall { tokenId: U256::from(7) }.abi_encode();
        h.settlement
            .respond_to(token_data.into(), Bytes::from(minted.result.query_result.abi_encode()))
            .await;
        let token_uri = INFTEE::tokenURICall { tokenId: U256::from(7) }.abi_encode();
        h.settlement
            .respond_to(token_uri.into(), Bytes::from("ipfs://meta".to_string().abi_encode()))
            .await;

        let rendered = orchestrator.render(U256::from(7)).await.unwrap();
        assert_eq!(rendered.lines, vec![" /\\_/", "( o.o )"]);
        assert_eq!(rendered.metadata_uri.as_deref(), Some("ipfs://meta"));
        assert_eq!(rendered.content, minted.result.query_result);
    }
}
