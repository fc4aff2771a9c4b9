//! Ciclo completo sobre el backend en memoria: ingesta, aprobación,
//! resolución y listados.
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use patch_core::{ApplicationConfigStore, ErrorEventStore, ErrorEventWorkflow, InMemoryQueue, InMemoryStore, IngestOutcome,
                 IngestionGateway, WorkflowError};
use patch_domain::{ApplicationConfig, ErrorReport, EventState, NaturalKey, NewApplicationConfig};

struct Harness {
    store: InMemoryStore,
    queue: InMemoryQueue,
    gateway: IngestionGateway<InMemoryStore, InMemoryStore, InMemoryQueue>,
    workflow: ErrorEventWorkflow<InMemoryStore, InMemoryQueue>,
}

fn harness() -> Harness {
    let store = InMemoryStore::new();
    let queue = InMemoryQueue::new();
    Harness { gateway: IngestionGateway::new(store.clone(), store.clone(), queue.clone()),
              workflow: ErrorEventWorkflow::new(store.clone(), queue.clone()),
              store,
              queue }
}

fn onboard(h: &Harness, unit: &str, app: &str, env: &str, auto_resolve: bool) -> ApplicationConfig {
    let cfg = NewApplicationConfig::new(NaturalKey::new(unit, app, env), "git@example.com:org/repo.git", "team@example.com")
        .with_auto_resolve(auto_resolve);
    ApplicationConfigStore::insert(&h.store, cfg).expect("onboard")
}

fn report(corr: &str) -> ErrorReport {
    ErrorReport::new(corr, "java.lang.IllegalStateException: boom", "checkout", Utc::now() - Duration::seconds(5))
}

#[test]
fn manual_approval_scenario() {
    let h = harness();
    onboard(&h, "RETAIL", "checkout", "prod", false);

    let out = h.gateway.ingest(report("c-1"), "RETAIL", "checkout", "prod").unwrap();
    assert!(!out.is_skipped());
    let IngestOutcome::Created { event_id, state } = out else { panic!("expected Created") };
    assert_eq!(state, EventState::PendingApproval);
    assert!(h.queue.submitted().is_empty(), "pending events are not enqueued");

    assert_eq!(h.workflow.approve(event_id), Ok(EventState::Processing));
    assert_eq!(h.queue.submitted(), vec![event_id]);

    let second = h.workflow.approve(event_id).unwrap_err();
    assert!(matches!(second, WorkflowError::IllegalTransition { from: EventState::Processing, .. }));
    assert_eq!(h.queue.submitted(), vec![event_id]);
}

#[test]
fn unknown_configuration_is_skipped() {
    let h = harness();
    onboard(&h, "RETAIL", "checkout", "prod", true);

    let out = h.gateway.ingest(report("c-2"), "RETAIL", "checkout", "staging").unwrap();
    assert_eq!(out, IngestOutcome::Skipped { key: NaturalKey::new("RETAIL", "checkout", "staging") });
    assert_eq!(h.store.event_count(), 0);
    for guess in 0..10 {
        assert_eq!(ErrorEventStore::find_by_id(&h.store, guess).unwrap(), None);
    }
    assert!(h.queue.submitted().is_empty());
}

#[test]
fn initial_state_is_decided_by_auto_resolve() {
    let h = harness();
    onboard(&h, "RETAIL", "auto", "prod", true);
    onboard(&h, "RETAIL", "manual", "prod", false);
    for i in 0..20 {
        let (app, expected) = if i % 2 == 0 { ("auto", EventState::Processing) } else { ("manual", EventState::PendingApproval) };
        match h.gateway.ingest(report(&format!("c-{i}")), "RETAIL", app, "prod").unwrap() {
            IngestOutcome::Created { state, .. } => assert_eq!(state, expected),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(h.queue.submitted().len(), 10);
}

#[test]
fn business_unit_listing_is_newest_first() {
    let h = harness();
    onboard(&h, "RETAIL", "checkout", "prod", false);
    onboard(&h, "RETAIL", "cart", "prod", true);
    onboard(&h, "BANKING", "ledger", "prod", true);
    for i in 0..6 {
        let app = if i % 2 == 0 { "checkout" } else { "cart" };
        h.gateway.ingest(report(&format!("r-{i}")), "RETAIL", app, "prod").unwrap();
    }
    h.gateway.ingest(report("b-0"), "BANKING", "ledger", "prod").unwrap();

    let events = ErrorEventStore::find_by_business_unit(&h.store, "RETAIL").unwrap();
    assert_eq!(events.len(), 6);
    assert!(events.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    assert_eq!(events[0].correlation_id, "r-5");
    assert!(events.iter().all(|e| e.correlation_id.starts_with("r-")));
}

#[test]
fn configuration_change_does_not_reclassify_existing_events() {
    let h = harness();
    let cfg = onboard(&h, "RETAIL", "checkout", "prod", false);
    let IngestOutcome::Created { event_id, .. } = h.gateway.ingest(report("c-3"), "RETAIL", "checkout", "prod").unwrap() else {
        panic!("expected Created")
    };

    h.store.set_auto_resolve(cfg.config_id, true).unwrap();

    // Un evento sólo cambia de estado por una transición explícita.
    let ev = h.workflow.find(event_id).unwrap();
    assert_eq!(ev.state, EventState::PendingApproval);
    assert_eq!(ev.occurrence_count, 1);
    assert!(h.queue.submitted().is_empty());

    // la nueva configuración sólo rige para lo que se ingiera después
    let later = h.gateway.ingest(report("c-3b"), "RETAIL", "checkout", "prod").unwrap();
    let IngestOutcome::Created { event_id: later_id, state } = later else { panic!("expected Created") };
    assert_eq!(state, EventState::Processing);
    assert_eq!(h.queue.submitted(), vec![later_id]);
    assert_eq!(h.workflow.find(event_id).unwrap().state, EventState::PendingApproval);
}

#[test]
fn concurrent_approvals_have_a_single_winner() {
    let h = Arc::new(harness());
    onboard(&h, "RETAIL", "checkout", "prod", false);
    let IngestOutcome::Created { event_id, .. } = h.gateway.ingest(report("c-4"), "RETAIL", "checkout", "prod").unwrap() else {
        panic!("expected Created")
    };

    let n = 8;
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n).map(|_| {
                                    let h = Arc::clone(&h);
                                    let barrier = Arc::clone(&barrier);
                                    thread::spawn(move || {
                                        barrier.wait();
                                        h.workflow.approve(event_id)
                                    })
                                })
                                .collect();
    let results: Vec<_> = handles.into_iter().map(|j| j.join().expect("thread")).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter()
                   .filter_map(|r| r.as_ref().err())
                   .all(|e| matches!(e, WorkflowError::IllegalTransition { .. })));
    assert_eq!(h.queue.submitted(), vec![event_id]);
}
