//! End-to-end dispatch: fan-out, failure isolation and actuation.

use std::sync::Arc;
use std::time::Duration;

use ripple_core::fakes::{
    verdict, FixedOracle, OracleBehavior, RecordingIssueTracker, RecordingNotifier,
    StaticContentSource,
};
use ripple_core::{
    Actuator, ChangeEvent, ChangeKind, ChangedFile, ConsumerPolicy, ContextFetcher,
    DependencyEdge, DerivativePolicy, EdgeKind, OracleError, Orchestrator, RelationshipGraph,
    TriagePipeline, TriageStage, TriageStatus, Urgency,
};

struct Harness {
    orchestrator: Orchestrator,
    oracle: FixedOracle,
    issues: Arc<RecordingIssueTracker>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(graph: RelationshipGraph, oracle: FixedOracle, source: StaticContentSource) -> Harness {
    let issues = Arc::new(RecordingIssueTracker::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let pipeline = TriagePipeline::new(
        ContextFetcher::new(Arc::new(source)),
        Arc::new(oracle.clone()),
    );
    let actuator = Actuator::new(issues.clone(), notifier.clone());
    Harness {
        orchestrator: Orchestrator::new(Arc::new(graph), pipeline, actuator),
        oracle,
        issues,
        notifier,
    }
}

fn api_consumer(target: &str) -> DependencyEdge {
    DependencyEdge::consumer(
        target,
        ConsumerPolicy::default()
            .with_triggers(["api_contract"])
            .with_interface_files(["client.py"]),
    )
}

fn health_event() -> ChangeEvent {
    ChangeEvent::new("org/provider", "0123456789abcdef")
        .with_message("Move health endpoint under /v1")
        .with_file(ChangedFile::new(
            "app.py",
            ChangeKind::Modified,
            "-@app.get(\"/health\")\n+@app.get(\"/v1/health\")",
        ))
        .with_keywords(["health"])
}

fn five_edge_graph() -> RelationshipGraph {
    RelationshipGraph::from_edges((1..=5).map(|i| ("org/provider", api_consumer(&format!("org/app{i}")))))
        .unwrap()
}

#[tokio::test]
async fn panicking_oracle_fails_only_its_edge() {
    let oracle = FixedOracle::answering(verdict(true, Urgency::Medium))
        .for_target("org/app3", OracleBehavior::Panic("oracle exploded".to_string()));
    let h = harness(five_edge_graph(), oracle, StaticContentSource::new());

    let report = h.orchestrator.dispatch(health_event()).await.unwrap();

    assert_eq!(report.outcomes.len(), 5);
    let completed: Vec<_> = report.outcomes.iter().filter(|o| o.is_completed()).collect();
    let failed: Vec<_> = report.outcomes.iter().filter(|o| o.is_failed()).collect();
    assert_eq!(completed.len(), 4);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].edge.target_repo, "org/app3");
    match &failed[0].status {
        TriageStatus::Failed { reason } => assert!(reason.contains("oracle exploded")),
        other => panic!("unexpected status {other:?}"),
    }

    let mut targets: Vec<_> = completed.iter().map(|o| o.edge.target_repo.clone()).collect();
    targets.sort();
    targets.dedup();
    assert_eq!(targets, vec!["org/app1", "org/app2", "org/app4", "org/app5"]);
    // medium: one issue per completed edge, no notification
    assert_eq!(h.issues.created().len(), 4);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn oracle_error_fails_only_its_edge() {
    let oracle = FixedOracle::answering(verdict(true, Urgency::Low)).for_target(
        "org/app3",
        OracleBehavior::Fail(OracleError::Timeout { after_secs: 60 }),
    );
    let h = harness(five_edge_graph(), oracle, StaticContentSource::new());

    let report = h.orchestrator.dispatch(health_event()).await.unwrap();

    assert_eq!(report.outcomes.iter().filter(|o| o.is_completed()).count(), 4);
    let failed: Vec<_> = report.outcomes.iter().filter(|o| o.is_failed()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].reached(TriageStage::Classifying));
    assert_eq!(h.oracle.calls(), 5);
}

#[tokio::test]
async fn edges_run_concurrently() {
    let oracle = FixedOracle::answering(verdict(false, Urgency::Low))
        .with_delay(Duration::from_millis(50));
    let h = harness(five_edge_graph(), oracle, StaticContentSource::new());

    let report = h.orchestrator.dispatch(health_event()).await.unwrap();

    assert_eq!(report.outcomes.len(), 5);
    assert!(
        h.oracle.max_in_flight() > 1,
        "expected overlapping oracle calls, max in flight was {}",
        h.oracle.max_in_flight()
    );
}

#[tokio::test]
async fn unknown_source_yields_no_outcomes() {
    let h = harness(
        five_edge_graph(),
        FixedOracle::answering(verdict(true, Urgency::Critical)),
        StaticContentSource::new(),
    );
    let report = h
        .orchestrator
        .dispatch(ChangeEvent::new("org/unrelated", "abc"))
        .await
        .unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(h.oracle.calls(), 0);
}

#[tokio::test]
async fn no_action_verdicts_never_reach_the_actuator() {
    for urgency in Urgency::ALL {
        let h = harness(
            five_edge_graph(),
            FixedOracle::answering(verdict(false, urgency)),
            StaticContentSource::new(),
        );
        let report = h.orchestrator.dispatch(health_event()).await.unwrap();
        assert_eq!(report.outcomes.iter().filter(|o| o.is_completed()).count(), 5);
        assert!(h.issues.created().is_empty(), "issue created for {urgency}");
        assert!(h.notifier.sent().is_empty(), "notification sent for {urgency}");
    }
}

#[tokio::test]
async fn health_endpoint_scenario_end_to_end() {
    let graph = RelationshipGraph::from_edges([
        ("org/provider", api_consumer("org/app")),
        (
            "org/provider",
            DependencyEdge::derivative(
                "org/fork",
                DerivativePolicy::default()
                    .with_shared(["docker"])
                    .with_divergent(["application_logic"]),
            ),
        ),
    ])
    .unwrap();
    let source = StaticContentSource::new().with_file(
        "org/app",
        "client.py",
        "resp = requests.get(f\"{BASE}/health\")",
    );
    let h = harness(graph, FixedOracle::answering(verdict(true, Urgency::High)), source);

    let report = h.orchestrator.dispatch(health_event()).await.unwrap();

    let consumer = report
        .outcomes
        .iter()
        .find(|o| o.edge.kind() == EdgeKind::Consumer)
        .unwrap();
    assert!(consumer.is_completed());
    assert!(consumer.reached(TriageStage::Classifying));

    // app.py is application logic, not a shared concern
    let fork = report
        .outcomes
        .iter()
        .find(|o| o.edge.kind() == EdgeKind::Derivative)
        .unwrap();
    assert!(fork.is_skipped());

    let issues = h.issues.created();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].repo, "org/app");
    assert_eq!(issues[0].title, "Dependency Update Required: org/provider");
    assert!(issues[0].body.contains("**Commit**: 0123456"));
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.oracle.last_context()[0].path, "client.py");
}

#[tokio::test]
async fn failed_context_fetch_still_classifies() {
    let graph = RelationshipGraph::from_edges([("org/provider", api_consumer("org/app"))]).unwrap();
    let source = StaticContentSource::new().with_failure(
        "org/app",
        "client.py",
        ripple_core::FetchError::Http { status: 500 },
    );
    let h = harness(graph, FixedOracle::answering(verdict(true, Urgency::High)), source);

    let report = h.orchestrator.dispatch(health_event()).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].reached(TriageStage::Classifying));
    assert!(report.outcomes[0].is_completed());
    assert_eq!(h.oracle.calls(), 1);
}

#[tokio::test]
async fn graph_update_during_triage_is_visible_to_next_dispatch() {
    let graph = Arc::new(
        RelationshipGraph::from_edges([("org/provider", api_consumer("org/app"))]).unwrap(),
    );
    let oracle = FixedOracle::answering(verdict(false, Urgency::Low))
        .with_delay(Duration::from_millis(20));
    let pipeline = TriagePipeline::new(
        ContextFetcher::new(Arc::new(StaticContentSource::new())),
        Arc::new(oracle),
    );
    let orchestrator = Orchestrator::new(Arc::clone(&graph), pipeline, Actuator::dry_run());

    let (first, _) = tokio::join!(orchestrator.dispatch(health_event()), async {
        graph
            .add_or_update_edge("org/provider", api_consumer("org/dashboard"))
            .unwrap();
    });
    let first = first.unwrap();
    let second = orchestrator.dispatch(health_event()).await.unwrap();

    assert!(first.outcomes.len() == 1 || first.outcomes.len() == 2);
    assert_eq!(second.outcomes.len(), 2);
}

#[tokio::test]
async fn background_runs_drain_on_shutdown() {
    let oracle = FixedOracle::answering(verdict(true, Urgency::Medium))
        .with_delay(Duration::from_millis(20));
    let h = harness(five_edge_graph(), oracle, StaticContentSource::new());

    let ack = h.orchestrator.accept(health_event()).unwrap();
    assert_eq!(ack.total_dependents, 5);
    assert_eq!(ack.consumers_scheduled.len(), 5);

    let report = h.orchestrator.shutdown(Duration::from_secs(10)).await;
    assert_eq!(report.abandoned, 0);
    assert_eq!(h.issues.created().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn shutdown_detaches_runs_past_grace() {
    let oracle = FixedOracle::answering(verdict(true, Urgency::Medium))
        .with_delay(Duration::from_secs(600));
    let h = harness(five_edge_graph(), oracle, StaticContentSource::new());

    h.orchestrator.accept(health_event()).unwrap();
    let report = h.orchestrator.shutdown(Duration::from_secs(1)).await;

    assert_eq!(report.finished, 0);
    assert_eq!(report.abandoned, 1);
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[tokio::test]
async fn dropping_orchestrator_keeps_accepted_runs_alive() {
    let graph = RelationshipGraph::from_edges([("org/provider", api_consumer("org/app"))]).unwrap();
    let oracle = FixedOracle::answering(verdict(true, Urgency::Medium))
        .with_delay(Duration::from_millis(20));
    let Harness {
        orchestrator,
        oracle,
        issues,
        ..
    } = harness(graph, oracle, StaticContentSource::new());

    let ack = orchestrator.accept(health_event()).unwrap();
    assert_eq!(ack.total_dependents, 1);
    drop(orchestrator);

    for _ in 0..50 {
        if !issues.created().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(oracle.calls(), 1);
    assert_eq!(issues.created().len(), 1);
}
