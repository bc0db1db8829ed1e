//! Reconciliation driver: inventory loading, events per target, triggers and
//! the run loop.


use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use jarvis::controller::{
    ClusterState, CommandReconciler, CommandResource, EventKind, Inventory, MemoryEventSink,
    StaticCluster, Trigger,
};
use jarvis::error::JarvisError;
use jarvis::grpc::GrpcAgentConnector;
use jarvis::targets::{
    EndpointRecord, MatchExpression, NodeRecord, NodeSelector, Operator, SelectorTerm,
};
use test_harness::{FakeBehavior, FakeConnector, TestAgent};

fn workers_only() -> NodeSelector {
    NodeSelector::new(vec![SelectorTerm::new(vec![MatchExpression::new(
        "role",
        Operator::In,
        &["worker"],
    )])])
}

fn test_inventory() -> Inventory {
    Inventory {
        nodes: vec![
            NodeRecord::new("cp-1").with_label("role", "control-plane"),
            NodeRecord::new("worker-1").with_label("role", "worker"),
            NodeRecord::new("worker-2").with_label("role", "worker"),
            NodeRecord::new("worker-3").with_label("role", "worker"),
        ],
        endpoints: vec![
            EndpointRecord::new("cp-1", "10.0.0.1"),
            EndpointRecord::new("worker-1", "10.0.0.11"),
            EndpointRecord::new("worker-2", "10.0.0.12"),
        ],
        commands: vec![CommandResource::new("uptime", "uptime").with_selector(workers_only())],
    }
}

struct Fixture {
    cluster: Arc<StaticCluster>,
    connector: Arc<FakeConnector>,
    events: Arc<MemoryEventSink>,
    reconciler: CommandReconciler,
}

fn fixture(inventory: Inventory, connector: FakeConnector) -> Fixture {
    let cluster = Arc::new(StaticCluster::new(inventory));
    let connector = Arc::new(connector);
    let events = Arc::new(MemoryEventSink::new());
    let reconciler = CommandReconciler::new(cluster.clone(), connector.clone(), events.clone());
    Fixture {
        cluster,
        connector,
        events,
        reconciler,
    }
}

// =============================================================================
// Single reconciliation rounds
// =============================================================================

#[tokio::test]
async fn test_round_records_one_event_per_selected_node() {
    let f = fixture(
        test_inventory(),
        FakeConnector::new().with("worker-2", FakeBehavior::fail_after(0, "connection refused")),
    );

    let job = f
        .reconciler
        .reconcile_command("uptime")
        .await
        .unwrap()
        .expect("command exists");
    assert_eq!(job.command_id(), "uptime");
    let report = job.wait().await.unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(f.connector.calls(), 2);

    let events = f.events.events_for("uptime");
    assert_eq!(events.len(), 3);

    // The advisory for the node without an agent comes before any dispatch
    assert_eq!(events[0].kind, EventKind::Warning);
    assert_eq!(events[0].reason, "uptime-worker-3");
    assert_eq!(
        events[0].message,
        "Agent not found for node worker-3 (skipping)"
    );

    let worker_1 = events.iter().find(|e| e.node == "worker-1").unwrap();
    assert_eq!(worker_1.kind, EventKind::Normal);
    assert_eq!(worker_1.message, "[worker-1] ❯ uptime\nok from worker-1\n");

    let worker_2 = events.iter().find(|e| e.node == "worker-2").unwrap();
    assert_eq!(worker_2.kind, EventKind::Warning);
    assert_eq!(
        worker_2.message,
        "Failed on worker-2: Transport error: connection refused"
    );

    assert!(events.iter().all(|e| e.node != "cp-1"));
}

#[tokio::test]
async fn test_duplicate_node_records_dispatch_once() {
    let inventory = Inventory {
        nodes: vec![
            NodeRecord::new("w1").with_label("role", "worker"),
            NodeRecord::new("w1").with_label("role", "worker"),
        ],
        endpoints: vec![EndpointRecord::new("w1", "10.0.0.11")],
        commands: vec![CommandResource::new("uptime", "uptime")],
    };
    let f = fixture(inventory, FakeConnector::new());

    let job = f
        .reconciler
        .reconcile_command("uptime")
        .await
        .unwrap()
        .expect("command exists");
    let report = job.wait().await.unwrap();

    assert_eq!(f.connector.calls(), 1);
    assert_eq!(report.len(), 1);
    assert_eq!(f.events.events_for("uptime").len(), 1);
}

#[tokio::test]
async fn test_missing_command_is_a_no_op() {
    let f = fixture(test_inventory(), FakeConnector::new());

    let job = f.reconciler.reconcile_command("deleted").await.unwrap();

    assert!(job.is_none());
    assert_eq!(f.connector.calls(), 0);
    assert!(f.events.events().is_empty());
}

#[tokio::test]
async fn test_invalid_selector_aborts_the_round() {
    let mut inventory = test_inventory();
    inventory.commands.push(
        CommandResource::new("broken", "reboot").with_selector(NodeSelector::new(vec![
            SelectorTerm::new(vec![MatchExpression {
                key: "role".to_string(),
                operator: "Matches".to_string(),
                values: vec!["worker".to_string()],
            }]),
        ])),
    );
    let f = fixture(inventory, FakeConnector::new());

    let result = f.reconciler.reconcile_command("broken").await;

    assert!(matches!(result, Err(JarvisError::Config(_))));
    assert_eq!(f.connector.calls(), 0);
    assert!(f.events.events().is_empty());
}

#[tokio::test]
async fn test_endpoint_change_reconciles_every_command() {
    let mut inventory = test_inventory();
    inventory
        .commands
        .push(CommandResource::new("df", "df -h"));
    inventory.commands.push(
        CommandResource::new("broken", "true").with_selector(NodeSelector::new(vec![
            SelectorTerm::new(vec![MatchExpression {
                key: "role".to_string(),
                operator: "Nope".to_string(),
                values: vec![],
            }]),
        ])),
    );
    let f = fixture(inventory, FakeConnector::new());

    let jobs = f
        .reconciler
        .reconcile(Trigger::AgentEndpointsChanged)
        .await
        .unwrap();

    // The broken command is skipped; the others still run
    let mut commands: Vec<_> = jobs.iter().map(|j| j.command_id().to_string()).collect();
    commands.sort();
    assert_eq!(commands, vec!["df".to_string(), "uptime".to_string()]);

    for job in jobs {
        job.wait().await.unwrap();
    }
    // df targets every node with an agent: cp-1, worker-1, worker-2
    assert_eq!(f.connector.calls(), 2 + 3);
    assert_eq!(f.events.events_for("df").len(), 4);
}

#[tokio::test]
async fn test_new_endpoint_is_picked_up_on_the_next_trigger() {
    let f = fixture(test_inventory(), FakeConnector::new());

    let job = f
        .reconciler
        .reconcile(Trigger::command("uptime"))
        .await
        .unwrap()
        .pop()
        .unwrap();
    job.wait().await.unwrap();
    assert_eq!(f.events.events().len(), 3);

    let mut endpoints = f.cluster.list_agent_endpoints().await.unwrap();
    endpoints.push(EndpointRecord::new("worker-3", "10.0.0.13"));
    f.cluster.set_endpoints(endpoints).await;
    f.events.clear();

    let jobs = f
        .reconciler
        .reconcile(Trigger::AgentEndpointsChanged)
        .await
        .unwrap();
    for job in jobs {
        let report = job.wait().await.unwrap();
        assert_eq!(report.success_count(), 3);
    }

    let events = f.events.events();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.kind == EventKind::Normal));
}

#[tokio::test]
async fn test_cancelled_job_reports_cancelled_events() {
    let f = fixture(
        test_inventory(),
        FakeConnector::new().with("worker-1", FakeBehavior::Hang),
    );

    let job = f
        .reconciler
        .reconcile_command("uptime")
        .await
        .unwrap()
        .unwrap();
    f.connector.wait_started().await;
    job.cancel();
    let report = job.wait().await.unwrap();

    assert_eq!(report.len(), 2);
    let worker_1 = f
        .events
        .events()
        .into_iter()
        .find(|e| e.node == "worker-1")
        .unwrap();
    assert_eq!(worker_1.kind, EventKind::Warning);
    assert_eq!(
        worker_1.message,
        "Dispatch to worker-1 cancelled before completion"
    );
}

// =============================================================================
// Run loop
// =============================================================================

#[tokio::test]
async fn test_run_loop_drains_jobs_when_triggers_close() {
    let f = fixture(
        test_inventory(),
        FakeConnector::new().with("worker-1", FakeBehavior::reply_after(50)),
    );
    let reconciler = Arc::new(f.reconciler);

    let (tx, rx) = mpsc::channel(8);
    let runner = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.run(rx, CancellationToken::new()).await })
    };

    tx.send(Trigger::command("uptime")).await.unwrap();
    tx.send(Trigger::command("unknown")).await.unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("run loop should stop once triggers close")
        .unwrap();

    let events = f.events.events_for("uptime");
    assert_eq!(events.len(), 3);
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == EventKind::Normal)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_run_loop_cancels_in_flight_jobs_on_shutdown() {
    let f = fixture(
        test_inventory(),
        FakeConnector::new()
            .with("worker-1", FakeBehavior::Hang)
            .with("worker-2", FakeBehavior::Hang),
    );
    let reconciler = Arc::new(f.reconciler);
    let shutdown = CancellationToken::new();

    let (tx, rx) = mpsc::channel(8);
    let runner = {
        let reconciler = reconciler.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reconciler.run(rx, shutdown).await })
    };

    tx.send(Trigger::command("uptime")).await.unwrap();
    f.connector.wait_started().await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("run loop should stop on shutdown")
        .unwrap();

    let cancelled = f
        .events
        .events()
        .into_iter()
        .filter(|e| e.message.ends_with("cancelled before completion"))
        .count();
    assert_eq!(cancelled, 2);
}

// =============================================================================
// Inventory files and real agents
// =============================================================================

#[tokio::test]
async fn test_inventory_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "nodes": [
                {{"name": "worker-1", "labels": {{"role": "worker"}}}},
                {{"name": "cp-1", "labels": {{"role": "control-plane"}}}}
            ],
            "endpoints": [
                {{"nodeName": "worker-1", "addresses": ["10.0.0.11"]}}
            ],
            "commands": [
                {{
                    "name": "uptime",
                    "spec": {{
                        "command": "uptime",
                        "selector": {{
                            "nodeSelectorTerms": [
                                {{"matchExpressions": [
                                    {{"key": "role", "operator": "In", "values": ["worker"]}}
                                ]}}
                            ]
                        }}
                    }}
                }}
            ]
        }}"#
    )
    .unwrap();

    let cluster = StaticCluster::from_file(file.path()).await.unwrap();

    assert_eq!(cluster.list_nodes().await.unwrap().len(), 2);
    assert_eq!(cluster.list_agent_endpoints().await.unwrap().len(), 1);
    let command = cluster.get_command("uptime").await.unwrap().unwrap();
    assert_eq!(command.spec.selector, workers_only());
}

#[tokio::test]
async fn test_invalid_inventory_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();

    let result = StaticCluster::from_file(file.path()).await;
    assert!(matches!(result, Err(JarvisError::Inventory(_))));

    let missing = StaticCluster::from_file("/nonexistent/inventory.json").await;
    assert!(matches!(missing, Err(JarvisError::Inventory(_))));
}

#[tokio::test]
async fn test_reconcile_against_real_agents() {
    let agent_a = TestAgent::start("node-a").await;
    let agent_b = TestAgent::start("node-b").await;

    let inventory = Inventory {
        nodes: vec![
            NodeRecord::new("node-a").with_label("pool", "blue"),
            NodeRecord::new("node-b").with_label("pool", "green"),
        ],
        endpoints: vec![
            EndpointRecord::new("node-a", agent_a.addr.to_string()),
            EndpointRecord::new("node-b", agent_b.addr.to_string()),
        ],
        commands: vec![CommandResource::new("greet", "echo hi; exit 2").with_selector(
            NodeSelector::new(vec![SelectorTerm::new(vec![MatchExpression::new(
                "pool",
                Operator::In,
                &["blue"],
            )])]),
        )],
    };

    let cluster = Arc::new(StaticCluster::new(inventory));
    let events = Arc::new(MemoryEventSink::new());
    let reconciler = CommandReconciler::new(
        cluster,
        Arc::new(GrpcAgentConnector::default()),
        events.clone(),
    );

    let job = reconciler.reconcile_command("greet").await.unwrap().unwrap();
    let report = job.wait().await.unwrap();

    assert_eq!(report.len(), 1);
    let events = events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Normal);
    assert_eq!(events[0].message, "[node-a] ❯ echo hi; exit 2 (exit 2)\nhi\n");

    agent_a.stop().await;
    agent_b.stop().await;
}

#[tokio::test]
async fn test_event_header_uses_the_name_the_agent_reports() {
    // The inventory calls the node worker-1; the agent knows itself by its host name
    let agent = TestAgent::start("ip-10-0-0-11").await;

    let inventory = Inventory {
        nodes: vec![NodeRecord::new("worker-1")],
        endpoints: vec![EndpointRecord::new("worker-1", agent.addr.to_string())],
        commands: vec![CommandResource::new("greet", "echo hi")],
    };

    let cluster = Arc::new(StaticCluster::new(inventory));
    let events = Arc::new(MemoryEventSink::new());
    let reconciler = CommandReconciler::new(
        cluster,
        Arc::new(GrpcAgentConnector::default()),
        events.clone(),
    );

    let job = reconciler.reconcile_command("greet").await.unwrap().unwrap();
    job.wait().await.unwrap();

    let events = events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].node, "worker-1");
    assert_eq!(events[0].reason, "greet-worker-1");
    assert_eq!(events[0].message, "[ip-10-0-0-11] ❯ echo hi\nhi\n");

    agent.stop().await;
}
