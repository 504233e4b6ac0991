use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use libp2p::PeerId;
use meshlite_net_peers::{AddressBook, OverflowPolicy, RetryPolicy, event_bus};
use meshlite_overlay::config::DEFAULT_PROTOCOL;
use meshlite_overlay::testing::{MockHost, MockRouting, mock_pair};
use meshlite_overlay::{
    BootstrapCoordinator, BootstrapJoinError, Host, SeedOutcome, SessionConfig, SessionRegistry,
    SessionSource, Sessions,
};
use meshlite_tasks::TaskManager;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

fn seed(peer: PeerId, port: u16) -> String {
    format!("/ip4/10.0.0.1/tcp/{port}/p2p/{peer}")
}

fn setup() -> (
    Arc<MockHost>,
    Arc<MockRouting>,
    SessionRegistry,
    BootstrapCoordinator<MockHost, MockRouting>,
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
    let coordinator =
        BootstrapCoordinator::new(host.clone(), routing.clone(), sessions, DEFAULT_PROTOCOL)
            .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(5)));
    (host, routing, registry, coordinator)
}

#[tokio::test(start_paused = true)]
async fn empty_seed_list_dials_nothing() {
    let (host, routing, registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();

    let report = coordinator
        .run(&AddressBook::parse(""), &shutdown)
        .await
        .unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(host.total_connect_calls(), 0);
    assert_eq!(routing.bootstraps(), 1);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn every_seed_but_self_is_dialed() {
    let (host, routing, registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();
    let peers: Vec<PeerId> = (0..3).map(|_| PeerId::random()).collect();

    let list = format!(
        "{},{};{},{}",
        seed(peers[0], 1),
        seed(host.local_peer_id(), 2),
        seed(peers[1], 3),
        seed(peers[2], 4)
    );
    let report = coordinator
        .run(&AddressBook::parse(&list), &shutdown)
        .await
        .unwrap();

    assert_eq!(report.connected(), 3);
    assert_eq!(report.outcomes[1], SeedOutcome::SkippedSelf);
    assert_eq!(host.total_connect_calls(), 3);
    assert_eq!(host.connect_calls(&host.local_peer_id()), 0);
    for peer in &peers {
        assert_eq!(host.connect_calls(peer), 1);
        assert_eq!(host.open_calls(peer), 1);
        assert_eq!(registry.count_for(peer), 1);
    }

    // Seeds are registered as trusted, non-querying entries.
    let registrations = routing.registrations();
    assert_eq!(registrations.len(), 3);
    assert!(registrations.iter().all(|(_, trusted, query)| *trusted && !*query));
}

#[tokio::test(start_paused = true)]
async fn failing_seed_is_abandoned_without_affecting_siblings() {
    let (host, _routing, _registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();
    let bad = PeerId::random();
    let good = PeerId::random();
    host.fail_connect_always(bad);

    let list = format!("{},{}", seed(bad, 1), seed(good, 2));
    let start = Instant::now();
    let report = coordinator
        .run(&AddressBook::parse(&list), &shutdown)
        .await
        .unwrap();

    assert_eq!(
        report.outcomes[0],
        SeedOutcome::Abandoned {
            peer: bad,
            attempts: 3
        }
    );
    assert_matches!(report.outcomes[1], SeedOutcome::Connected { peer, .. } if peer == good);
    assert_eq!(start.elapsed(), Duration::from_secs(15));
    assert_eq!(host.connect_calls(&bad), 3);
    assert_eq!(host.open_calls(&bad), 0);
}

#[tokio::test(start_paused = true)]
async fn seed_recovers_within_retry_budget() {
    let (host, _routing, registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();
    let peer = PeerId::random();
    host.fail_connect(peer, 2);

    let report = coordinator
        .run(&AddressBook::parse(&seed(peer, 1)), &shutdown)
        .await
        .unwrap();

    assert_eq!(report.connected(), 1);
    assert_eq!(host.connect_calls(&peer), 3);
    assert_eq!(registry.count_for(&peer), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_entries_are_skipped() {
    let (host, _routing, _registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();
    let peer = PeerId::random();

    let list = format!("nonsense,/ip4/10.0.0.1/tcp/1,{}", seed(peer, 2));
    let report = coordinator
        .run(&AddressBook::parse(&list), &shutdown)
        .await
        .unwrap();

    assert_eq!(report.outcomes[0], SeedOutcome::Invalid);
    assert_eq!(report.outcomes[1], SeedOutcome::Invalid);
    assert_eq!(report.connected(), 1);
    assert_eq!(host.total_connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn stream_failure_is_not_retried() {
    let (host, _routing, registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();
    let peer = PeerId::random();
    host.fail_streams(peer);

    let report = coordinator
        .run(&AddressBook::parse(&seed(peer, 1)), &shutdown)
        .await
        .unwrap();

    assert_eq!(report.outcomes, vec![SeedOutcome::StreamFailed { peer }]);
    assert_eq!(host.connect_calls(&peer), 1);
    assert_eq!(host.open_calls(&peer), 1);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_registration_still_dials() {
    let (host, routing, _registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();
    let peer = PeerId::random();
    routing.reject(peer);

    let report = coordinator
        .run(&AddressBook::parse(&seed(peer, 1)), &shutdown)
        .await
        .unwrap();

    assert_eq!(report.connected(), 1);
    assert_eq!(routing.registrations(), vec![(peer, true, false)]);
    assert_eq!(host.connect_calls(&peer), 1);
}

#[tokio::test(start_paused = true)]
async fn join_failure_aborts_before_dialing() {
    let (host, routing, _registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();
    routing.fail_bootstrap("no route");

    let result = coordinator
        .run(&AddressBook::parse(&seed(PeerId::random(), 1)), &shutdown)
        .await;

    assert_matches!(result, Err(BootstrapJoinError::Query(_)));
    assert_eq!(host.total_connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_retry_delay() {
    let (host, _routing, _registry, coordinator) = setup();
    let (signal, shutdown) = meshlite_tasks::signal();
    let peer = PeerId::random();
    host.fail_connect_always(peer);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        signal.fire();
    });

    let start = Instant::now();
    let report = coordinator
        .run(&AddressBook::parse(&seed(peer, 1)), &shutdown)
        .await
        .unwrap();

    assert_eq!(report.outcomes, vec![SeedOutcome::Cancelled { peer }]);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert_eq!(host.connect_calls(&peer), 1);
}

#[tokio::test]
async fn handshake_is_written_then_stream_becomes_a_session() {
    let (host, _routing, registry, coordinator) = setup();
    let (_signal, shutdown) = meshlite_tasks::signal();
    let peer = PeerId::random();
    let raw = seed(peer, 1);

    let report = coordinator
        .run(&AddressBook::parse(&raw), &shutdown)
        .await
        .unwrap();
    let session = match &report.outcomes[0] {
        SeedOutcome::Connected { session, .. } => *session,
        other => panic!("unexpected outcome {other:?}"),
    };

    let remote = host.take_remote(&peer).unwrap();
    let mut lines = BufReader::new(remote.rx).lines();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        format!("Initial hello from {raw}")
    );
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "bootstrap: hello from /ip4/127.0.0.1/tcp/4001"
    );

    let info = registry.sessions();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].key, session);
    assert_eq!(info[0].source, SessionSource::Bootstrap);
}
