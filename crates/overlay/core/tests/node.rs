use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use libp2p::PeerId;
use meshlite_net_peers::{AddressBook, OverflowPolicy, event_bus};
use meshlite_overlay::testing::{MockHost, MockRouting};
use meshlite_overlay::{
    BootstrapJoinError, Host, NodeError, OverlayConfig, OverlayNode, SessionSource,
};
use meshlite_tasks::TaskManager;
use tokio::io::{AsyncBufReadExt, BufReader};

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn join_failure_is_fatal() {
    let manager = TaskManager::current();
    let (sink, events) = event_bus(16, OverflowPolicy::DropNewest);
    let host = Arc::new(MockHost::default());
    let routing = Arc::new(MockRouting::new(sink));
    routing.fail_bootstrap("unreachable");

    let node = OverlayNode::new(host.clone(), routing, OverlayConfig::default());
    let result = node
        .start(AddressBook::default(), events, &manager.executor())
        .await;

    assert_matches!(
        result,
        Err(NodeError::Bootstrap(BootstrapJoinError::Query(_)))
    );
    assert_eq!(host.total_connect_calls(), 0);
}

#[tokio::test]
async fn seedless_node_idles_and_serves_inbound() {
    let manager = TaskManager::current();
    let (sink, events) = event_bus(16, OverflowPolicy::DropNewest);
    let host = Arc::new(MockHost::default());
    let routing = Arc::new(MockRouting::new(sink));

    let node = OverlayNode::new(host.clone(), routing.clone(), OverlayConfig::default());
    let mut handle = node
        .start(AddressBook::default(), events, &manager.executor())
        .await
        .unwrap();

    let report = handle.bootstrap_report().await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(host.total_connect_calls(), 0);
    assert_eq!(
        handle.local_addr().to_string(),
        format!("/ip4/127.0.0.1/tcp/4001/p2p/{}", host.local_peer_id())
    );

    // Inbound stream: connect back, register, serve.
    let peer = PeerId::random();
    let remote = host.inject_inbound(peer);
    eventually(|| handle.sessions().count_for(&peer) >= 1).await;
    assert_eq!(routing.registrations()[0], (peer, true, true));

    let mut lines = BufReader::new(remote.rx).lines();
    let line = lines.next_line().await.unwrap().unwrap();
    assert_eq!(line, format!("inbound: hello from {}", handle.local_addr()));
}

#[tokio::test]
async fn membership_event_becomes_discovery_session() {
    let manager = TaskManager::current();
    let (sink, events) = event_bus(16, OverflowPolicy::DropNewest);
    let host = Arc::new(MockHost::default());
    let routing = Arc::new(MockRouting::new(sink));

    let node = OverlayNode::new(host.clone(), routing.clone(), OverlayConfig::default());
    let handle = node
        .start(AddressBook::default(), events, &manager.executor())
        .await
        .unwrap();

    let peer = PeerId::random();
    routing.add_member(peer);
    eventually(|| handle.sessions().count_for(&peer) == 1).await;
    assert_eq!(handle.sessions().sessions()[0].source, SessionSource::Discovery);

    // Default policy tears the session down when the peer leaves the table.
    routing.remove_member(peer);
    eventually(|| handle.sessions().count_for(&peer) == 0).await;
    assert_eq!(host.connect_calls(&peer), 1);
}

#[tokio::test]
async fn seeds_are_dialed_in_background_and_sessions_close_on_shutdown() {
    let mut manager = TaskManager::current();
    let (sink, events) = event_bus(16, OverflowPolicy::DropNewest);
    let host = Arc::new(MockHost::default());
    let routing = Arc::new(MockRouting::new(sink));
    let seed = PeerId::random();

    let node = OverlayNode::new(host.clone(), routing.clone(), OverlayConfig::default());
    let mut handle = node
        .start(
            AddressBook::parse(&format!("/ip4/10.0.0.2/tcp/4001/p2p/{seed}")),
            events,
            &manager.executor(),
        )
        .await
        .unwrap();

    let report = handle.bootstrap_report().await.unwrap();
    assert_eq!(report.connected(), 1);
    assert!(handle.sessions().count_for(&seed) >= 1);

    manager.fire_shutdown();
    handle.close_sessions();
    assert!(handle.sessions().is_empty());
}
