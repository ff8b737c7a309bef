//! Tests for batch submission and status polling
//!
//! The wallet is replaced by a scripted provider that answers status queries
//! from a queue, so poll timing can be checked against tokio's paused clock.
//! Orchestrator tests run on the real clock since the registry talks to SQLite.

#[cfg(test)]
mod tests {
    use crate::{
        BatchHandle, BatchKind, BatchStatus, BookingCompleted, BookingCreated, CallsStatus, EventTypeCreated,
        HookEvent, RecordId,
        batch::{BatchOrchestrator, BatchOutcome, CallBuilder, TransactionBatchSubmitter},
        config::{PollingConfig, WalletConfig},
        contracts::ApproveCall,
        error::BatchError,
        registry::Registry,
        sink::BatchReport,
        state::BatchTracker,
        test_utils::{RecordingSink, ScriptedWallet, confirmed, pending, sample_log},
    };
    use ethers::abi::AbiDecode;
    use ethers::types::{Address, Bytes, U256};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    const PM_URL: &str = "https://paymaster.example/rpc";
    const BASE_SEPOLIA: u64 = 0x14a34;

    fn polling(interval_ms: u64) -> PollingConfig {
        PollingConfig { interval_ms, ..Default::default() }
    }

    fn wallet_config() -> WalletConfig {
        WalletConfig {
            rpc_url: "http://127.0.0.1:8546".into(),
            chain_id: BASE_SEPOLIA,
            payment_token: Address::repeat_byte(0x0c),
            paymaster_url: Some(PM_URL.into()),
        }
    }

    fn booking_created(booking_id: u64) -> HookEvent {
        HookEvent::BookingCreated(BookingCreated {
            user_wallet_address: Address::repeat_byte(0x05),
            booking_id: RecordId::Number(booking_id),
            to: Address::repeat_byte(0xb0),
            data: Bytes::from(vec![0xde, 0xad]),
            price_at_booking: U256::from(25_000_000u64),
        })
    }

    fn submitter(wallet: &Arc<ScriptedWallet>, polling: PollingConfig) -> TransactionBatchSubmitter {
        TransactionBatchSubmitter::new(wallet.clone(), polling, BatchTracker::new())
    }

    fn handle(calls_id: &str) -> BatchHandle {
        BatchHandle { calls_id: calls_id.to_string(), attributes: Default::default() }
    }

    #[test]
    fn test_booking_batch_puts_approval_first() {
        let batch = CallBuilder::new(&wallet_config()).build(&booking_created(1));

        assert_eq!(batch.kind, BatchKind::BookingCreated);
        assert!(batch.atomic_required);
        assert_eq!(batch.calls.len(), 2);

        let approval = ApproveCall::decode(&batch.calls[0].data).unwrap();
        assert_eq!(batch.calls[0].to, Address::repeat_byte(0x0c));
        assert_eq!(approval.spender, Address::repeat_byte(0xb0));
        assert_eq!(approval.amount, U256::from(25_000_000u64));

        assert_eq!(batch.calls[1].to, Address::repeat_byte(0xb0));
        assert_eq!(batch.calls[1].data, Bytes::from(vec![0xde, 0xad]));

        let data_callback = batch.capabilities.data_callback.unwrap();
        let kinds: Vec<_> = data_callback.requests.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, ["email", "name"]);
        assert!(data_callback.requests.iter().all(|r| !r.optional));
    }

    #[test]
    fn test_single_call_flows() {
        let builder = CallBuilder::new(&wallet_config());

        let completion = builder.build(&HookEvent::BookingCompleted(BookingCompleted {
            user_wallet_address: Address::repeat_byte(0x05),
            booking_id: RecordId::Number(8),
            to: Address::repeat_byte(0xb0),
            data: Bytes::from(vec![0x01]),
        }));
        assert_eq!(completion.calls.len(), 1);
        assert!(completion.atomic_required);
        assert!(completion.capabilities.data_callback.is_none());

        let event_type = builder.build(&HookEvent::EventTypeCreated(EventTypeCreated {
            partner_wallet_address: Address::repeat_byte(0x06),
            event_type_id: RecordId::Number(3),
            to: Address::repeat_byte(0xe0),
            data: Bytes::from(vec![0x02]),
        }));
        assert_eq!(event_type.from, Address::repeat_byte(0x06));
        assert_eq!(event_type.calls.len(), 1);
        assert!(!event_type.atomic_required);
        assert!(event_type.capabilities.data_callback.is_none());
        assert_eq!(event_type.capabilities.paymaster_service.unwrap().url, PM_URL);
    }

    #[tokio::test]
    async fn test_submit_preserves_call_order() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        let submitter = submitter(&wallet, polling(2000));
        let batch = CallBuilder::new(&wallet_config()).build(&booking_created(1));

        let handle = submitter
            .submit(batch.calls.clone(), batch.from, batch.chain_id, batch.capabilities, true)
            .await
            .unwrap();

        assert_eq!(handle.calls_id, "0xbundle");
        let submitted = wallet.submissions();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].calls, batch.calls);
        assert!(submitted[0].atomic_required);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_submitted() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        let submitter = submitter(&wallet, polling(2000));

        let err = submitter
            .submit(vec![], Address::zero(), BASE_SEPOLIA.into(), Default::default(), true)
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::EmptyBatch));
        assert!(wallet.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission_is_not_retried() {
        let wallet = ScriptedWallet::rejecting("user rejected the request");
        let submitter = submitter(&wallet, polling(2000));
        let batch = CallBuilder::new(&wallet_config()).build(&booking_created(1));

        let err = submitter
            .submit(batch.calls, batch.from, batch.chain_id, batch.capabilities, true)
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::Submission(_)));
        assert!(err.to_string().contains("user rejected"));
        assert_eq!(wallet.submissions().len(), 1);
        assert_eq!(wallet.query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_pending_answers_take_two_intervals() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        wallet.script(vec![Ok(pending()), Ok(pending()), Ok(confirmed("0xabc", vec![]))]);
        let submitter = submitter(&wallet, polling(2000));

        let start = Instant::now();
        let status = submitter.await_terminal(&handle("0xbundle"), &CancellationToken::new()).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(4000));
        assert_eq!(status.status, BatchStatus::Confirmed);
        assert_eq!(wallet.query_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_outcome_keeps_hash_and_logs() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        let logs = vec![sample_log(), sample_log()];
        wallet.script(vec![Ok(confirmed("0xabc", logs.clone()))]);
        let submitter = submitter(&wallet, polling(2000));

        let status = submitter.await_terminal(&handle("0xbundle"), &CancellationToken::new()).await.unwrap();
        let outcome = BatchOutcome::from_status("0xbundle", status).unwrap();

        assert_eq!(outcome.transaction_hash, "0xabc");
        assert_eq!(outcome.logs, logs);
    }

    #[test]
    fn test_confirmed_without_receipt() {
        let status = CallsStatus { status: BatchStatus::Confirmed, receipts: vec![] };
        let err = BatchOutcome::from_status("0xbundle", status).unwrap_err();
        assert!(matches!(err, BatchError::MissingReceipt { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_stops_polling() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        wallet.script(vec![Ok(pending()), Ok(CallsStatus { status: BatchStatus::Failed, receipts: vec![] })]);
        let submitter = submitter(&wallet, polling(2000));

        let err = submitter.await_terminal(&handle("0xbundle"), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BatchError::Failed { status: BatchStatus::Failed, .. }));
        assert_eq!(wallet.query_count(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(wallet.query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_handle_is_never_resubmitted() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        wallet.script(vec![Ok(confirmed("0xabc", vec![]))]);
        let submitter = submitter(&wallet, polling(2000));
        let handle = handle("0xbundle");

        let first = submitter.await_terminal(&handle, &CancellationToken::new()).await.unwrap();
        let second = submitter.await_terminal(&handle, &CancellationToken::new()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(wallet.query_count(), 1);
        assert!(wallet.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_forever_times_out() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        let submitter = submitter(&wallet, PollingConfig { interval_ms: 2000, max_attempts: 3, ..Default::default() });

        let err = submitter.await_terminal(&handle("0xbundle"), &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, BatchError::Timeout { attempts: 3, .. }));
        assert_eq!(wallet.query_count(), 3);
        assert_eq!(submitter.tracker().get("0xbundle").await.unwrap().state, "abandoned");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_back_off() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        wallet.script(vec![
            Err("connection reset".into()),
            Err("connection reset".into()),
            Ok(confirmed("0xabc", vec![])),
        ]);
        let submitter = submitter(&wallet, polling(2000));

        let start = Instant::now();
        submitter.await_terminal(&handle("0xbundle"), &CancellationToken::new()).await.unwrap();

        // 2s after the first error, 4s after the second
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
        assert_eq!(wallet.query_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_poll_errors_give_up() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        wallet.script((0..10).map(|_| Err("timeout".to_string())).collect());
        let submitter = submitter(&wallet, PollingConfig { interval_ms: 100, max_poll_errors: 3, ..Default::default() });

        let err = submitter.await_terminal(&handle("0xbundle"), &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, BatchError::Poll { attempts: 3, .. }));
        assert_eq!(wallet.query_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_answer_resets_error_count() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        wallet.script(vec![
            Err("timeout".into()),
            Err("timeout".into()),
            Ok(pending()),
            Err("timeout".into()),
            Err("timeout".into()),
            Ok(confirmed("0xabc", vec![])),
        ]);
        let submitter = submitter(&wallet, PollingConfig { interval_ms: 100, max_poll_errors: 3, ..Default::default() });

        let status = submitter.await_terminal(&handle("0xbundle"), &CancellationToken::new()).await.unwrap();
        assert!(status.status.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        let submitter = Arc::new(submitter(&wallet, polling(2000)));
        let cancel = CancellationToken::new();

        let task = {
            let submitter = submitter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { submitter.await_terminal(&handle("0xbundle"), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(5000)).await;
        cancel.cancel();
        let err = task.await.unwrap().unwrap_err();

        assert!(matches!(err, BatchError::Cancelled { .. }));
        let queries = wallet.query_count();
        assert_eq!(queries, 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(wallet.query_count(), queries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_poller_on_same_handle_is_refused() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        let submitter = Arc::new(submitter(&wallet, polling(2000)));
        let cancel = CancellationToken::new();

        let task = {
            let submitter = submitter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { submitter.await_terminal(&handle("0xbundle"), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(wallet.query_count(), 1);

        let err = submitter.await_terminal(&handle("0xbundle"), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BatchError::AlreadyPolling { .. }));
        assert_eq!(wallet.query_count(), 1);
        assert_eq!(submitter.tracker().get("0xbundle").await.unwrap().state, "polling");

        // cancelling through the tracker reaches the loop that owns the handle
        assert!(submitter.tracker().cancel("0xbundle").await);
        assert!(matches!(task.await.unwrap(), Err(BatchError::Cancelled { .. })));
        assert!(cancel.is_cancelled());
    }

    /// Helper function to wire an orchestrator around a scripted wallet
    async fn orchestrator(wallet: &Arc<ScriptedWallet>, sink: &Arc<RecordingSink>) -> (BatchOrchestrator, Registry) {
        let registry = Registry::connect("sqlite::memory:").await.unwrap();
        let submitter = Arc::new(submitter(wallet, polling(10)));
        let orchestrator = BatchOrchestrator::new(
            CallBuilder::new(&wallet_config()),
            submitter,
            sink.clone(),
            registry.clone(),
        );
        (orchestrator, registry)
    }

    #[tokio::test]
    async fn test_booking_end_to_end() {
        let wallet = ScriptedWallet::responding(
            serde_json::from_value(json!({
                "callsId": "0xbundle",
                "capabilities": { "dataCallback": { "email": "ada@example.com", "name": "Ada" } }
            }))
            .unwrap(),
        );
        wallet.script(vec![Ok(pending()), Ok(confirmed("0xdeadbeef", vec![]))]);
        let sink = Arc::new(RecordingSink::default());
        let (orchestrator, registry) = orchestrator(&wallet, &sink).await;

        let (handle, task) = orchestrator.dispatch(booking_created(77)).await.unwrap();
        assert_eq!(handle.calls_id, "0xbundle");
        task.await.unwrap();

        let request = serde_json::to_value(&wallet.submissions()[0]).unwrap();
        assert_eq!(request["chainId"], json!("0x14a34"));
        assert_eq!(request["version"], json!("1.0"));
        assert_eq!(request["atomicRequired"], json!(true));
        assert_eq!(request["capabilities"]["paymasterService"]["url"], json!(PM_URL));
        assert_eq!(request["calls"].as_array().unwrap().len(), 2);

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        match &reports[0] {
            BatchReport::Success { kind, record_id, transaction_hash, attributes, .. } => {
                assert_eq!(*kind, BatchKind::BookingCreated);
                assert_eq!(*record_id, RecordId::Number(77));
                assert_eq!(transaction_hash, "0xdeadbeef");
                assert_eq!(attributes["email"], json!("ada@example.com"));
            }
            other => panic!("expected success report, got {other:?}"),
        }

        let payload = reports[0].payload();
        assert_eq!(payload["tx_hash"], json!("0xdeadbeef"));
        assert_eq!(payload["booking_id"], json!(77));

        let record = registry.get("0xbundle").await.unwrap().unwrap();
        assert_eq!(record.status, "CONFIRMED");
        assert_eq!(record.transaction_hash.as_deref(), Some("0xdeadbeef"));
        assert_eq!(orchestrator.status("0xbundle").await.unwrap().state, "terminal");
    }

    #[tokio::test]
    async fn test_evicted_batch_status_comes_from_registry() {
        let wallet = ScriptedWallet::accepting("0xfirst");
        wallet.script(vec![Ok(confirmed("0xaaa", vec![])), Ok(confirmed("0xbbb", vec![]))]);
        let sink = Arc::new(RecordingSink::default());
        let registry = Registry::connect("sqlite::memory:").await.unwrap();
        let submitter =
            Arc::new(TransactionBatchSubmitter::new(wallet.clone(), polling(10), BatchTracker::with_capacity(1)));
        let orchestrator =
            BatchOrchestrator::new(CallBuilder::new(&wallet_config()), submitter.clone(), sink.clone(), registry);

        let (_, task) = orchestrator.dispatch(booking_created(1)).await.unwrap();
        task.await.unwrap();
        wallet.accept_as("0xsecond");
        let (_, task) = orchestrator.dispatch(booking_created(2)).await.unwrap();
        task.await.unwrap();

        assert_eq!(sink.reports().len(), 2);
        assert_eq!(submitter.tracker().retained().await, 1);
        assert_eq!(orchestrator.status("0xsecond").await.unwrap().state, "terminal");

        let first = orchestrator.status("0xfirst").await.unwrap();
        assert_eq!(first.state, "recorded");
        let record = first.record.unwrap();
        assert_eq!(record.status, "CONFIRMED");
        assert_eq!(record.transaction_hash.as_deref(), Some("0xaaa"));

        assert!(orchestrator.status("0xnever").await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_dispatch_is_reported() {
        let wallet = ScriptedWallet::rejecting("user rejected the request");
        let sink = Arc::new(RecordingSink::default());
        let (orchestrator, _registry) = orchestrator(&wallet, &sink).await;

        let err = orchestrator.dispatch(booking_created(5)).await.unwrap_err();
        assert!(matches!(err, BatchError::Submission(_)));

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            &reports[0],
            BatchReport::Failure { calls_id: None, record_id: RecordId::Number(5), .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_batch_is_reported() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        wallet.script(vec![Ok(CallsStatus { status: BatchStatus::Reverted, receipts: vec![] })]);
        let sink = Arc::new(RecordingSink::default());
        let (orchestrator, registry) = orchestrator(&wallet, &sink).await;

        let (_, task) = orchestrator.dispatch(booking_created(6)).await.unwrap();
        task.await.unwrap();

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].event_name(), "batch_failed");
        assert!(matches!(&reports[0], BatchReport::Failure { calls_id: Some(id), .. } if id == "0xbundle"));

        let record = registry.get("0xbundle").await.unwrap().unwrap();
        assert_eq!(record.status, "REVERTED");
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_batch_is_not_reported() {
        let wallet = ScriptedWallet::accepting("0xbundle");
        let sink = Arc::new(RecordingSink::default());
        let (orchestrator, registry) = orchestrator(&wallet, &sink).await;

        let (handle, task) = orchestrator.dispatch(booking_created(9)).await.unwrap();
        assert!(orchestrator.cancel(&handle.calls_id).await);
        task.await.unwrap();

        assert!(sink.reports().is_empty());
        assert!(!orchestrator.cancel(&handle.calls_id).await);
        assert_eq!(orchestrator.status(&handle.calls_id).await.unwrap().state, "abandoned");
        assert_eq!(registry.get("0xbundle").await.unwrap().unwrap().status, "CANCELLED");
    }
}
