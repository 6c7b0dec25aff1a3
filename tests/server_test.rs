//! Integration tests for HTTP delivery against the local receiver

#[cfg(feature = "server")]
mod server_tests {
    use input_relay::server::{run, ReceiverState, ServerConfig};
    use input_relay::{
        BatchSender, DeliveryOutcome, Event, EventQueue, HttpTransport, PendingStore,
        SenderConfig, Transport, TransportError,
    };
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    /// Start a receiver on its own runtime so the blocking transport can be
    /// driven from the test thread.
    fn start_receiver() -> (
        tokio::runtime::Runtime,
        SocketAddr,
        Arc<ReceiverState>,
        tokio::sync::oneshot::Sender<()>,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build runtime");
        let (addr, state, shutdown_tx) = runtime
            .block_on(run(ServerConfig::new(0)))
            .expect("Failed to start server");
        (runtime, addr, state, shutdown_tx)
    }

    fn transport_for(addr: SocketAddr) -> HttpTransport {
        HttpTransport::new(&format!("http://{addr}/api/input"), Duration::from_secs(5))
            .expect("Failed to build transport")
    }

    #[test]
    fn test_http_transport_delivers_batch() {
        let (runtime, addr, state, shutdown_tx) = start_receiver();
        let transport = transport_for(addr);

        let events = vec![
            Event::keyboard("a").with_window("Editor"),
            Event::mouse_scroll(10, 20, 0, -3),
        ];
        transport.send(&events).expect("Batch should be accepted");

        let received = runtime.block_on(state.events());
        assert_eq!(received.len(), 2);
        assert_eq!(received[0]["type"], "keyboard");
        assert_eq!(received[0]["window"], "Editor");
        assert_eq!(received[1]["delta"], "0,-3");

        let _ = shutdown_tx.send(());
    }

    #[test]
    fn test_rejection_is_reported() {
        let (_runtime, addr, state, shutdown_tx) = start_receiver();
        let transport = transport_for(addr);
        state.set_rejecting(true);

        let err = transport.send(&[Event::keyboard("a")]).unwrap_err();
        assert!(matches!(err, TransportError::Rejected { status: 503, .. }));

        let _ = shutdown_tx.send(());
    }

    #[test]
    fn test_sender_recovers_after_receiver_outage() {
        let (runtime, addr, state, shutdown_tx) = start_receiver();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.jsonl");

        let sender = BatchSender::new(
            SenderConfig::new(Duration::from_secs(1), 2),
            EventQueue::new(),
            PendingStore::new(&path),
            Arc::new(transport_for(addr)),
        );
        for i in 0..5 {
            sender.queue().enqueue(Event::keyboard(i.to_string()));
        }

        state.set_rejecting(true);
        let outcome = sender.run_cycle().unwrap().unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Failed { delivered: 0, .. }));
        assert_eq!(PendingStore::new(&path).load().len(), 5);

        state.set_rejecting(false);
        let outcome = sender.run_cycle().unwrap().unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered(5));
        assert!(!path.exists());
        assert_eq!(runtime.block_on(state.received()), 5);

        sender.stop();
        let _ = shutdown_tx.send(());
    }

    #[test]
    fn test_missing_events_list_is_bad_request() {
        let (runtime, addr, _state, shutdown_tx) = start_receiver();

        let status = runtime.block_on(async {
            reqwest::Client::new()
                .post(format!("http://{addr}/api/input"))
                .json(&serde_json::json!({ "items": [] }))
                .send()
                .await
                .expect("Failed to send request")
                .status()
        });
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

        let _ = shutdown_tx.send(());
    }

    #[test]
    fn test_recent_events_newest_first() {
        let (runtime, addr, _state, shutdown_tx) = start_receiver();
        let transport = transport_for(addr);
        let events: Vec<Event> = (0..3).map(|i| Event::keyboard(i.to_string())).collect();
        transport.send(&events).unwrap();

        let body: serde_json::Value = runtime.block_on(async {
            reqwest::get(format!("http://{addr}/api/events?limit=2"))
                .await
                .expect("Failed to send request")
                .json()
                .await
                .expect("Failed to parse JSON")
        });
        let listed = body.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["data"], "2");
        assert_eq!(listed[1]["data"], "1");

        let _ = shutdown_tx.send(());
    }
}
