//! Wiring runtime components through the container

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulwark_container::{Container, ContainerError, Entry, Registration};
use bulwark_core::{Context, Task, TaskError};
use bulwark_execution::{Executor, ExecutorConfig};
use bulwark_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

impl std::fmt::Debug for dyn Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Clock")
    }
}

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

trait Job: Send + Sync {
    fn task(&self) -> Task;
}

struct FailingJob;

impl Job for FailingJob {
    fn task(&self) -> Task {
        Task::named("failing-job", |_ctx| async { Err(TaskError::failed("down")) })
    }
}

#[tokio::test]
async fn shared_breaker_resolved_from_container() {
    let container = Container::new();
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 2,
        open_duration: Duration::from_secs(60),
    })
    .unwrap();

    container
        .provide_all([
            Registration::from(Entry::<CircuitBreaker>::singleton(Arc::new(breaker)).named("breaker")),
            Registration::from(
                Entry::<Executor>::singleton(Arc::new(
                    Executor::new(ExecutorConfig::default()).unwrap(),
                ))
                .named("executor"),
            ),
            Registration::from(
                Entry::<dyn Job>::factory(|_| Arc::new(FailingJob) as Arc<dyn Job>).named("job"),
            ),
        ])
        .unwrap();

    let executor = container.resolve::<Executor>().unwrap();
    let job = container.resolve_named::<dyn Job>("job").unwrap();

    for _ in 0..2 {
        let breaker = container.resolve_named::<CircuitBreaker>("breaker").unwrap();
        let result = executor
            .run(&breaker.wrap(&job.task()), Context::background())
            .await;
        assert!(matches!(result, Err(TaskError::Failed(_))));
    }

    let breaker = container.resolve::<CircuitBreaker>().unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected = executor
        .run(&breaker.wrap(&job.task()), Context::background())
        .await;
    assert!(matches!(rejected, Err(TaskError::CircuitOpen { .. })));
}

#[test]
fn factory_can_resolve_its_dependencies() {
    let container = Container::new();
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();

    container
        .provide(Entry::<dyn Clock>::singleton(Arc::new(FixedClock(1_000))).named("clock"))
        .unwrap();
    container
        .provide(
            Entry::<dyn Clock>::try_factory(move |container| {
                counter.fetch_add(1, Ordering::SeqCst);
                let base = container.resolve_named::<dyn Clock>("clock")?;
                Ok(Arc::new(FixedClock(base.now_millis() + 500)) as Arc<dyn Clock>)
            })
            .named("skewed"),
        )
        .unwrap();

    assert_eq!(
        container
            .resolve_named::<dyn Clock>("skewed")
            .unwrap()
            .now_millis(),
        1_500
    );
    assert_eq!(container.resolve_at::<dyn Clock>(0).unwrap().now_millis(), 1_000);
    assert_eq!(container.resolve_all::<dyn Clock>().unwrap().len(), 2);
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn lookup_failures_are_typed() {
    let container = Container::new();
    container
        .provide(Entry::<dyn Clock>::singleton(Arc::new(FixedClock(0))).named("clock"))
        .unwrap();

    assert!(matches!(
        container.resolve::<dyn Job>(),
        Err(ContainerError::NotFound(_))
    ));
    assert!(matches!(
        container.resolve_at::<dyn Clock>(1),
        Err(ContainerError::NotFound(_))
    ));
    assert!(matches!(
        container.resolve_named::<dyn Job>("clock"),
        Err(ContainerError::TypeMismatch { .. })
    ));

    let duplicate =
        container.provide(Entry::<dyn Job>::singleton(Arc::new(FailingJob)).named("clock"));
    assert!(matches!(duplicate, Err(ContainerError::DuplicateName { .. })));
    assert_eq!(container.len(), 1);
}

#[test]
fn failing_factory_surfaces_as_factory_failed() {
    let container = Container::new();
    container
        .provide(Entry::<dyn Clock>::try_factory(|_| {
            Err(anyhow::anyhow!("clock source unavailable"))
        }))
        .unwrap();

    let error = container.resolve::<dyn Clock>().unwrap_err();
    assert!(matches!(error, ContainerError::FactoryFailed { .. }));
    assert!(std::error::Error::source(&error).is_some());
}
