use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use libp2p::PeerId;
use meshlite_net_peers::{OverflowPolicy, event_bus};
use meshlite_overlay::testing::{MockHost, MockRouting, mock_pair, stream_pair};
use meshlite_overlay::{
    Host, InboundOutcome, InboundStreamHandler, SessionConfig, SessionRegistry, SessionSource,
    Sessions,
};
use meshlite_tasks::TaskManager;
use tokio::io::AsyncReadExt;

fn handler() -> (
    Arc<MockHost>,
    Arc<MockRouting>,
    SessionRegistry,
    InboundStreamHandler<MockHost, MockRouting>,
) {
    let (sink, _events) = event_bus(64, OverflowPolicy::DropNewest);
    let (host, routing) = mock_pair(sink);
    let registry = SessionRegistry::new();
    let sessions = Sessions::new(
        registry.clone(),
        SessionConfig::default(),
        "/ip4/127.0.0.1/tcp/4001",
        TaskManager::current().executor(),
    );
    let handler = InboundStreamHandler::new(host.clone(), routing.clone(), sessions)
        .with_connect_timeout(Duration::from_secs(5));
    (host, routing, registry, handler)
}

#[tokio::test(start_paused = true)]
async fn unconnected_peer_is_connected_registered_and_served() {
    let (host, routing, registry, handler) = handler();
    let peer = PeerId::random();
    let (stream, _remote) = stream_pair(1024);

    let outcome = handler.handle(peer, stream).await;

    assert_matches!(outcome, InboundOutcome::SessionStarted(key) if key.peer == peer);
    assert_eq!(host.connect_calls(&peer), 1);
    assert_eq!(routing.registrations(), vec![(peer, true, true)]);
    assert_eq!(registry.count_for(&peer), 1);
    assert_eq!(registry.sessions()[0].source, SessionSource::Inbound);
}

#[tokio::test(start_paused = true)]
async fn connected_peer_is_not_dialed_again() {
    let (host, routing, registry, handler) = handler();
    let peer = PeerId::random();
    host.mark_connected(peer);
    let (stream, _remote) = stream_pair(1024);

    handler.handle(peer, stream).await;

    assert_eq!(host.connect_calls(&peer), 0);
    assert_eq!(routing.registrations().len(), 1);
    assert_eq!(registry.count_for(&peer), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_abandons_stream() {
    let (host, routing, registry, handler) = handler();
    let peer = PeerId::random();
    host.delay_connect(peer, Duration::from_secs(30));
    let (stream, remote) = stream_pair(1024);

    let outcome = handler.handle(peer, stream).await;

    assert_eq!(outcome, InboundOutcome::Abandoned);
    assert!(routing.registrations().is_empty());
    assert!(registry.is_empty());

    // The stream was dropped, so the remote reads EOF.
    let mut rx = remote.rx;
    let mut buf = Vec::new();
    assert_eq!(rx.read_to_end(&mut buf).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn connect_failure_abandons_stream() {
    let (host, routing, registry, handler) = handler();
    let peer = PeerId::random();
    host.fail_connect(peer, 1);
    let (stream, _remote) = stream_pair(1024);

    let outcome = handler.handle(peer, stream).await;

    assert_eq!(outcome, InboundOutcome::Abandoned);
    assert_eq!(host.connect_calls(&peer), 1);
    assert!(routing.registrations().is_empty());
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_registration_still_starts_session() {
    let (_host, routing, registry, handler) = handler();
    let peer = PeerId::random();
    routing.reject(peer);
    let (stream, _remote) = stream_pair(1024);

    let outcome = handler.handle(peer, stream).await;

    assert_matches!(outcome, InboundOutcome::SessionStarted(_));
    assert_eq!(registry.count_for(&peer), 1);
}

#[tokio::test]
async fn serve_spawns_a_handler_per_stream() {
    let (host, _routing, registry, handler) = handler();
    let (signal, shutdown) = meshlite_tasks::signal();
    let incoming = host.accept(meshlite_overlay::config::DEFAULT_PROTOCOL).unwrap();
    let task = tokio::spawn(Arc::new(handler).serve(incoming, shutdown));

    let a = PeerId::random();
    let b = PeerId::random();
    let _ra = host.inject_inbound(a);
    let _rb = host.inject_inbound(b);

    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(registry.count_for(&a), 1);
    assert_eq!(registry.count_for(&b), 1);

    signal.fire();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(host.accept(meshlite_overlay::config::DEFAULT_PROTOCOL).is_err());
}
