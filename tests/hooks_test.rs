//! Hook Tests
//!
//! Which lifecycle callbacks fire for which outcomes, and wiring of the
//! bundled tracing, metrics and composite hooks through the builder.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use relayer::batch::{Orchestrator, Response, SubRequest};
use relayer::engine::{BatchContext, ExecutionContext};
use relayer::hooks::{CompositeHook, ExecutionHook, Fault, FaultHook, MetricsHook, TracingHook};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start { id: String, tenant: Option<String> },
    Complete { id: String, status: u16 },
    Fault { id: String },
}

#[derive(Default)]
struct RecordingHook {
    events: Mutex<Vec<Event>>,
}

impl RecordingHook {
    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl ExecutionHook for RecordingHook {
    fn on_start(&self, ctx: &ExecutionContext, request: &SubRequest) {
        self.events.lock().push(Event::Start {
            id: request.id.clone(),
            tenant: ctx.tenant_id().map(str::to_owned),
        });
    }

    fn on_complete(
        &self,
        _ctx: &ExecutionContext,
        request: &SubRequest,
        response: &Response,
        _duration: Duration,
    ) {
        self.events.lock().push(Event::Complete {
            id: request.id.clone(),
            status: response.status,
        });
    }
}

impl FaultHook for RecordingHook {
    fn on_fault(&self, _ctx: &ExecutionContext, request: &SubRequest, _fault: &Fault) {
        self.events.lock().push(Event::Fault {
            id: request.id.clone(),
        });
    }
}

fn orchestrator_with(hook: Arc<RecordingHook>, max_batch_size: usize) -> Orchestrator {
    let orch = Orchestrator::builder()
        .with_max_batch_size(max_batch_size)
        .with_execution_hook(hook.clone())
        .with_fault_hook(hook)
        .build()
        .unwrap();
    orch.register_fn("echo", |_ctx, payload| async move { Ok(payload) })
        .unwrap();
    orch.register_fn("boom", |_ctx, _payload| async move {
        if true {
            panic!("boom");
        }
        Ok(Value::Null)
    })
    .unwrap();
    orch
}

#[tokio::test]
async fn test_hook_lifecycle_for_success() {
    let hook = Arc::new(RecordingHook::default());
    let orch = orchestrator_with(hook.clone(), 0);

    orch.execute_batch(
        &BatchContext::new(),
        vec![SubRequest::new("1", "tenant-a", "echo", json!(1))],
    )
    .await;

    assert_eq!(
        hook.events(),
        vec![
            Event::Start { id: "1".into(), tenant: Some("tenant-a".into()) },
            Event::Complete { id: "1".into(), status: 200 },
        ]
    );
}

#[tokio::test]
async fn test_hook_counts_for_mixed_batch() {
    let hook = Arc::new(RecordingHook::default());
    let orch = orchestrator_with(hook.clone(), 0);

    let batch = vec![
        SubRequest::new("1", "t", "echo", json!(1)),
        SubRequest::new("2", "t", "echo", json!(2)),
        SubRequest::new("3", "t", "missing", json!(3)),
        SubRequest::new("4", "", "echo", json!(4)),
        SubRequest::new("5", "t", "boom", json!(5)),
    ];
    let results = orch.execute_batch(&BatchContext::new(), batch).await;
    let statuses: Vec<u16> = results.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![200, 200, 404, 400, 500]);

    // Handler ran for 1, 2 and 5
    assert_eq!(hook.count(|e| matches!(e, Event::Start { .. })), 3);
    // Everything that passed validation completes, including the 404
    assert_eq!(hook.count(|e| matches!(e, Event::Complete { .. })), 4);
    assert_eq!(hook.count(|e| matches!(e, Event::Fault { .. })), 1);

    assert!(!hook.events().iter().any(|e| match e {
        Event::Start { id, .. } | Event::Complete { id, .. } | Event::Fault { id } => id == "4",
    }));
    assert!(!hook.events().contains(&Event::Start { id: "3".into(), tenant: Some("t".into()) }));
    assert!(hook.events().contains(&Event::Complete { id: "3".into(), status: 404 }));
}

#[tokio::test]
async fn test_fault_precedes_complete() {
    let hook = Arc::new(RecordingHook::default());
    let orch = orchestrator_with(hook.clone(), 0);

    orch.execute_batch(
        &BatchContext::new(),
        vec![SubRequest::new("1", "t", "boom", Value::Null)],
    )
    .await;

    assert_eq!(
        hook.events(),
        vec![
            Event::Start { id: "1".into(), tenant: Some("t".into()) },
            Event::Fault { id: "1".into() },
            Event::Complete { id: "1".into(), status: 500 },
        ]
    );
}

#[tokio::test]
async fn test_no_hooks_for_oversized_batch() {
    let hook = Arc::new(RecordingHook::default());
    let orch = orchestrator_with(hook.clone(), 2);

    let batch: Vec<SubRequest> = (0..3)
        .map(|i| SubRequest::new(i.to_string(), "t", "echo", json!(i)))
        .collect();
    let results = orch.execute_batch(&BatchContext::new(), batch).await;

    assert!(results.iter().all(|r| r.status == 413));
    assert!(hook.events().is_empty());
}

#[tokio::test]
async fn test_composite_with_bundled_hooks() {
    relayer::telemetry::init_tracing();

    let recorder = Arc::new(RecordingHook::default());
    let composite = Arc::new(
        CompositeHook::new()
            .with_hook(Arc::new(TracingHook))
            .with_hook(Arc::new(MetricsHook))
            .with_hook(recorder.clone()),
    );

    let orch = Orchestrator::builder()
        .with_execution_hook(composite.clone())
        .with_fault_hook(composite)
        .build()
        .unwrap();
    let recipe = "hooks-test-composite";
    orch.register_fn(recipe, |ctx, _payload| async move {
        Ok(json!(ctx.tenant_id().unwrap_or_default()))
    })
    .unwrap();

    let results = orch
        .execute_batch(
            &BatchContext::new(),
            vec![
                SubRequest::new("1", "tenant-a", recipe, Value::Null),
                SubRequest::new("2", "tenant-b", recipe, Value::Null),
            ],
        )
        .await;

    assert_eq!(results[0].data, Some(json!("tenant-a")));
    assert_eq!(results[1].data, Some(json!("tenant-b")));

    assert_eq!(MetricsHook::starts_total(recipe), 2);
    assert_eq!(MetricsHook::requests_total(recipe, 200), 2);
    assert_eq!(MetricsHook::faults_total(recipe), 0);
    assert_eq!(recorder.count(|e| matches!(e, Event::Complete { status: 200, .. })), 2);

    let text = relayer::hooks::metrics::gather_text();
    assert!(text.contains("relayer_recipe_starts_total"));
}
