//! `bulwark simulate`: fan simulated tasks out through the configured policies

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context as _, Result};
use bulwark_config::BulwarkConfig;
use bulwark_container::{Container, Entry};
use bulwark_core::{Context, Task, TaskError};
use bulwark_execution::Executor;
use bulwark_resilience::{CircuitMetrics, CircuitState};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{info, warn};

/// Arguments of the `simulate` subcommand
#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub tasks: usize,
    pub failure_rate: f64,
    pub latency_ms: u64,
    pub seed: Option<u64>,
}

/// How one simulated attempt behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub latency: Duration,
    pub fail: bool,
}

/// Source of simulated attempt outcomes
pub trait FailureInjector: Send + Sync {
    fn next_attempt(&self) -> Attempt;
}

/// Fails attempts with a fixed probability, latency uniform in `[0, 2L]`
pub struct RandomInjector {
    failure_rate: f64,
    max_latency_ms: u64,
    rng: Mutex<StdRng>,
}

impl RandomInjector {
    pub fn new(failure_rate: f64, latency_ms: u64, seed: Option<u64>) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&failure_rate),
            "failure rate must be between 0 and 1, got {}",
            failure_rate
        );

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            failure_rate,
            max_latency_ms: latency_ms.saturating_mul(2),
            rng: Mutex::new(rng),
        })
    }
}

impl FailureInjector for RandomInjector {
    fn next_attempt(&self) -> Attempt {
        let mut rng = self.rng.lock();
        Attempt {
            fail: rng.gen_bool(self.failure_rate),
            latency: Duration::from_millis(rng.gen_range(0..=self.max_latency_ms)),
        }
    }
}

/// A task whose every attempt asks `injector` how to behave
pub fn simulated_task(index: usize, injector: Arc<dyn FailureInjector>) -> Task {
    Task::named(format!("simulated-{index}"), move |ctx: Context| {
        let attempt = injector.next_attempt();
        async move {
            ctx.sleep(attempt.latency).await?;
            if attempt.fail {
                return Err(TaskError::failed("injected failure"));
            }
            Ok(())
        }
    })
}

/// Outcome counts of a simulation run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    /// Failures keyed by [`TaskError::kind`]
    pub failed: BTreeMap<&'static str, usize>,
}

impl Summary {
    pub fn record(&mut self, result: &bulwark_core::Result<()>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => *self.failed.entry(e.kind()).or_default() += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed.values().sum::<usize>()
    }
}

/// Everything a simulation run reports
#[derive(Debug, Clone)]
pub struct Report {
    pub summary: Summary,
    pub breaker: Option<(CircuitState, CircuitMetrics)>,
    pub elapsed: Duration,
}

/// Run the simulation under `ctx`
pub async fn simulate(config: &BulwarkConfig, args: &SimulateArgs, ctx: &Context) -> Result<Report> {
    let pipeline = config
        .policies
        .build()
        .context("Invalid policy configuration")?;

    let container = Container::new();
    container.provide(
        Entry::<dyn FailureInjector>::singleton(Arc::new(RandomInjector::new(
            args.failure_rate,
            args.latency_ms,
            args.seed,
        )?))
        .named("injector"),
    )?;
    container.provide(
        Entry::<Executor>::singleton(Arc::new(Executor::new(config.execution.clone())?))
            .named("executor"),
    )?;

    let injector = container.resolve::<dyn FailureInjector>()?;
    let executor = container.resolve::<Executor>()?;

    info!(
        tasks = args.tasks,
        failure_rate = args.failure_rate,
        latency_ms = args.latency_ms,
        "Starting simulation"
    );

    let started = Instant::now();
    let tasks = (0..args.tasks).map(|index| pipeline.apply(&simulated_task(index, injector.clone())));
    let completions = executor.launch_all(tasks, ctx);

    let mut summary = Summary::default();
    for result in Executor::join_all(completions).await {
        summary.record(&result);
    }

    Ok(Report {
        summary,
        breaker: pipeline
            .circuit_breaker()
            .map(|breaker| (breaker.state(), breaker.metrics())),
        elapsed: started.elapsed(),
    })
}

/// Run the simulation and print a summary, cancelling on Ctrl-C
pub async fn handle_simulate(config: &BulwarkConfig, args: SimulateArgs) -> Result<()> {
    let ctx = Context::background();

    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding tasks");
            signal_ctx.cancel();
        }
    });

    let report = simulate(config, &args, &ctx).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &Report) {
    let summary = &report.summary;

    println!("Tasks:     {}", summary.total());
    println!("Succeeded: {}", summary.succeeded);
    for (kind, count) in &summary.failed {
        println!("  {:<20} {}", kind, count);
    }

    match &report.breaker {
        Some((state, metrics)) => println!(
            "Breaker:   {} ({} requests, {} failures, {} rejected)",
            state, metrics.total_requests, metrics.total_failures, metrics.total_rejected
        ),
        None => println!("Breaker:   disabled"),
    }

    println!("Elapsed:   {}ms", report.elapsed.as_millis());
}
