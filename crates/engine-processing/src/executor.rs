use crate::{
    error::ResolveError,
    invoke::{InvocationPolicy, Invoker},
    resolver::resolve_order,
    stream::processor::StreamProcessor,
};
use engine_config::EngineSettings;
use engine_core::{
    checker::{Checker, CheckerContext},
    metrics::Metrics,
    retry::RetryPolicy,
    source::ValidationInput,
};
use futures::future::join_all;
use model::{CheckerSpec, ExecutionMode, PipelineStage, ValidationContext, ValidationResult};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A checker spec bound to its implementation.
#[derive(Clone)]
pub struct PlannedChecker {
    pub spec: CheckerSpec,
    pub checker: Arc<dyn Checker>,
}

impl std::fmt::Debug for PlannedChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedChecker")
            .field("spec", &self.spec)
            .field("capabilities", &self.checker.capabilities())
            .finish()
    }
}

/// A stage whose checkers are resolved, ordered and bound.
#[derive(Debug, Clone)]
pub struct StagePlan {
    stage: PipelineStage,
    order: Vec<PlannedChecker>,
}

impl StagePlan {
    /// Resolves the execution order and looks up every implementation.
    /// Nothing runs if any of that fails.
    pub fn new<L>(stage: PipelineStage, lookup: L) -> Result<Self, ResolveError>
    where
        L: Fn(&str) -> Option<Arc<dyn Checker>>,
    {
        let order = resolve_order(&stage)?
            .into_iter()
            .map(|idx| {
                let spec = stage.checkers[idx].clone();
                match lookup(&spec.checker) {
                    Some(checker) => Ok(PlannedChecker { spec, checker }),
                    None => Err(ResolveError::UnknownImplementation {
                        checker: spec.name.clone(),
                        implementation: spec.checker.clone(),
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { stage, order })
    }

    pub fn name(&self) -> &str {
        &self.stage.name
    }

    pub fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    pub fn order(&self) -> &[PlannedChecker] {
        &self.order
    }

    pub fn checker_names(&self) -> Vec<&str> {
        self.order.iter().map(|p| p.spec.name.as_str()).collect()
    }
}

/// What one stage produced.
#[derive(Debug, Default)]
pub struct StageReport {
    pub results: Vec<ValidationResult>,
    /// Conditional checkers whose dependencies did not hold.
    pub skipped: Vec<String>,
    pub has_critical: bool,
}

impl StageReport {
    /// Whether later stages may run under `stage`'s failure policy.
    pub fn allows_continuation(&self, stage: &PipelineStage) -> bool {
        stage.continue_on_failure || !self.has_critical
    }
}

/// Runs one stage at a time under its execution mode.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    settings: Arc<EngineSettings>,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl StageExecutor {
    pub fn new(settings: Arc<EngineSettings>, metrics: Metrics, cancel: CancellationToken) -> Self {
        Self {
            settings,
            metrics,
            cancel,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Runs `plan`. Every produced result is recorded in `context` and
    /// appended to `history`, which also serves as the prior-results view
    /// handed to checkers.
    pub async fn execute(
        &self,
        plan: &StagePlan,
        input: &ValidationInput,
        context: &mut ValidationContext,
        history: &mut Vec<ValidationResult>,
    ) -> StageReport {
        let stage = plan.stage();
        info!(
            stage = %stage.name,
            mode = ?stage.execution_mode,
            checkers = plan.order().len(),
            "Starting stage"
        );

        let report = match stage.execution_mode {
            ExecutionMode::Parallel => self.run_parallel(plan, input, context, history).await,
            ExecutionMode::Sequential | ExecutionMode::Conditional => {
                self.run_in_order(plan, input, context, history).await
            }
        };

        info!(
            stage = %stage.name,
            results = report.results.len(),
            skipped = report.skipped.len(),
            has_critical = report.has_critical,
            "Stage finished"
        );
        report
    }

    async fn run_in_order(
        &self,
        plan: &StagePlan,
        input: &ValidationInput,
        context: &mut ValidationContext,
        history: &mut Vec<ValidationResult>,
    ) -> StageReport {
        let stage = plan.stage();
        let mut report = StageReport::default();

        // Invocations drop their handles before returning, so make_mut
        // records in place.
        let mut shared = Arc::new(std::mem::take(context));
        let mut prior = Arc::new(std::mem::take(history));

        for planned in plan.order() {
            if self.cancel.is_cancelled() {
                warn!(stage = %stage.name, checker = %planned.spec.name, "Run cancelled, not starting checker");
                break;
            }

            if stage.execution_mode == ExecutionMode::Conditional
                && !dependencies_hold(&planned.spec, &prior)
            {
                info!(
                    stage = %stage.name,
                    checker = %planned.spec.name,
                    "Skipping checker, dependencies did not pass"
                );
                self.metrics.increment_skipped();
                report.skipped.push(planned.spec.name.clone());
                continue;
            }

            let results = self
                .run_checker(planned, stage, input, Arc::clone(&shared), Arc::clone(&prior), None)
                .await;

            record(
                results,
                Arc::make_mut(&mut shared),
                Arc::make_mut(&mut prior),
                &mut report,
            );
        }

        *context = unshare(shared);
        *history = unshare(prior);
        report
    }

    async fn run_parallel(
        &self,
        plan: &StagePlan,
        input: &ValidationInput,
        context: &mut ValidationContext,
        history: &mut Vec<ValidationResult>,
    ) -> StageReport {
        let stage = plan.stage();
        let mut report = StageReport::default();

        if self.cancel.is_cancelled() {
            return report;
        }

        let deadline = stage.timeout().map(|t| Instant::now() + t);
        let snapshot = Arc::new(std::mem::take(context));
        let prior = Arc::new(std::mem::take(history));

        let runs = plan.order().iter().map(|planned| {
            self.run_checker(
                planned,
                stage,
                input,
                Arc::clone(&snapshot),
                Arc::clone(&prior),
                deadline,
            )
        });
        let completed = join_all(runs).await;

        *context = unshare(snapshot);
        *history = unshare(prior);
        for results in completed {
            record(results, context, history, &mut report);
        }

        report
    }

    fn policy(&self, spec: &CheckerSpec, stage: &PipelineStage, deadline: Option<Instant>) -> InvocationPolicy {
        let exec = &self.settings.executor;
        InvocationPolicy {
            timeout: effective_timeout(spec, stage, exec.default_timeout()),
            retry: RetryPolicy::with_retries(
                spec.retry_count,
                exec.retry_base_delay(),
                exec.retry_max_delay(),
            ),
            deadline,
        }
    }

    /// Runs one checker over the whole input, or chunk by chunk when it can
    /// stream and the input is large enough.
    async fn run_checker(
        &self,
        planned: &PlannedChecker,
        stage: &PipelineStage,
        input: &ValidationInput,
        context: Arc<ValidationContext>,
        prior: Arc<Vec<ValidationResult>>,
        deadline: Option<Instant>,
    ) -> Vec<ValidationResult> {
        let spec = &planned.spec;
        let invoker = Invoker::new(
            spec.name.as_str(),
            self.policy(spec, stage, deadline),
            self.metrics.clone(),
            self.cancel.clone(),
        );
        let base = CheckerContext::new(spec.name.clone(), context, prior, spec.config.clone());

        let streams = planned.checker.capabilities().streaming;
        let total = input.total_bytes();
        if streams && total > self.settings.stream.streaming_threshold_bytes {
            info!(
                checker = %spec.name,
                total_bytes = total,
                threshold = self.settings.stream.streaming_threshold_bytes,
                "Streaming checker over chunks"
            );
            let processor = StreamProcessor::new(&self.settings.stream, self.metrics.clone());
            return processor
                .process(input.source(), &planned.checker, &invoker, &base)
                .await;
        }

        let checker = Arc::clone(&planned.checker);
        let input = input.clone();
        let location = input.descriptor().dataset.clone();
        let result = invoker
            .invoke(&base, &location, move |ctx| {
                let checker = Arc::clone(&checker);
                let input = input.clone();
                Box::pin(async move { checker.validate(&input, &ctx).await })
            })
            .await;
        vec![result]
    }
}

fn record(
    results: Vec<ValidationResult>,
    context: &mut ValidationContext,
    history: &mut Vec<ValidationResult>,
    report: &mut StageReport,
) {
    for result in results {
        context.record_result(&result);
        history.push(result.clone());
        report.has_critical |= result.has_critical();
        report.results.push(result);
    }
}

/// Takes the value back out of a stage-wide handle, copying only if a
/// checker kept a reference past its invocation.
fn unshare<T: Clone>(shared: Arc<T>) -> T {
    Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone())
}

/// Every dependency produced at least one result and all of them are valid.
fn dependencies_hold(spec: &CheckerSpec, history: &[ValidationResult]) -> bool {
    spec.dependencies.iter().all(|dep| {
        let mut produced = history.iter().filter(|r| &r.checker_name == dep).peekable();
        produced.peek().is_some() && produced.all(|r| r.is_valid())
    })
}

/// The spec's timeout, else the stage's, else `fallback`.
pub fn effective_timeout(spec: &CheckerSpec, stage: &PipelineStage, fallback: Duration) -> Duration {
    spec.timeout().or_else(|| stage.timeout()).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_core::{
        checker::CheckerCapabilities,
        error::CheckerError,
        source::{InMemorySource, SourceDescriptor},
    };
    use model::{ValidationIssue, execution::context::VALIDATION_RESULTS_KEY};
    use std::sync::Mutex;
    use tracing_test::traced_test;

    /// Records the prior results it saw, then reports per its mode.
    struct Observer {
        critical: bool,
        delay: Duration,
        seen: Arc<Mutex<Vec<(String, usize, usize)>>>,
    }

    #[async_trait]
    impl Checker for Observer {
        fn capabilities(&self) -> CheckerCapabilities {
            CheckerCapabilities::new("observer")
        }

        async fn validate(
            &self,
            _input: &ValidationInput,
            ctx: &CheckerContext,
        ) -> Result<ValidationResult, CheckerError> {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().unwrap().push((
                ctx.checker_name().to_string(),
                ctx.prior_results().len(),
                ctx.context().recorded_results(),
            ));
            let mut result = ctx.new_result();
            if self.critical {
                result.push_issue(ValidationIssue::critical("broken", "it broke", "data"));
            }
            Ok(result)
        }
    }

    fn input() -> ValidationInput {
        ValidationInput::from_source(InMemorySource::zeroed(SourceDescriptor::new(
            "data",
            vec![16, 2],
            "u8",
            1,
        )))
    }

    fn executor() -> StageExecutor {
        let mut settings = EngineSettings::default();
        settings.executor = settings.executor.without_backoff();
        StageExecutor::new(Arc::new(settings), Metrics::new(), CancellationToken::new())
    }

    fn observer(
        critical: bool,
        delay_ms: u64,
        seen: &Arc<Mutex<Vec<(String, usize, usize)>>>,
    ) -> Arc<dyn Checker> {
        Arc::new(Observer {
            critical,
            delay: Duration::from_millis(delay_ms),
            seen: Arc::clone(seen),
        })
    }

    fn plan(stage: PipelineStage, checkers: Vec<(&str, Arc<dyn Checker>)>) -> StagePlan {
        StagePlan::new(stage, |key| {
            checkers
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, c)| Arc::clone(c))
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_implementation_is_rejected() {
        let stage = PipelineStage::new("s", ExecutionMode::Sequential)
            .with_checker(CheckerSpec::new("a").with_checker("missing"));
        let err = StagePlan::new(stage, |_| None).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownImplementation {
                checker: "a".into(),
                implementation: "missing".into()
            }
        );
    }

    #[traced_test]
    #[tokio::test]
    async fn test_sequential_records_between_checkers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stage = PipelineStage::new("seq", ExecutionMode::Sequential)
            .with_checker(CheckerSpec::new("second").depends_on("first"))
            .with_checker(CheckerSpec::new("first"));
        let plan = plan(
            stage,
            vec![("first", observer(false, 0, &seen)), ("second", observer(false, 0, &seen))],
        );

        let mut context = ValidationContext::new();
        let mut history = Vec::new();
        let report = executor()
            .execute(&plan, &input(), &mut context, &mut history)
            .await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("first".to_string(), 0, 0), ("second".to_string(), 1, 1)]
        );
        assert_eq!(context.recorded_results(), 2);
        assert!(context.metadata()[VALIDATION_RESULTS_KEY].is_array());
        assert!(logs_contain("Starting stage"));
    }

    #[tokio::test]
    async fn test_parallel_shares_one_snapshot() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stage = PipelineStage::new("par", ExecutionMode::Parallel)
            .with_checker(CheckerSpec::new("slow"))
            .with_checker(CheckerSpec::new("fast"));
        let plan = plan(
            stage,
            vec![("slow", observer(false, 50, &seen)), ("fast", observer(false, 0, &seen))],
        );

        let mut context = ValidationContext::new();
        let mut history = Vec::new();
        let report = executor()
            .execute(&plan, &input(), &mut context, &mut history)
            .await;

        let names: Vec<_> = report.results.iter().map(|r| r.checker_name.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
        assert!(seen.lock().unwrap().iter().all(|(_, prior, _)| *prior == 0));
        assert_eq!(context.recorded_results(), 2);
    }

    #[tokio::test]
    async fn test_parallel_stage_deadline() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stage = PipelineStage::new("par", ExecutionMode::Parallel)
            .with_timeout(Duration::from_millis(50))
            .with_checker(CheckerSpec::new("hang").with_timeout(Duration::from_secs(30)))
            .with_checker(CheckerSpec::new("quick"));
        let plan = plan(
            stage,
            vec![("hang", observer(false, 10_000, &seen)), ("quick", observer(false, 0, &seen))],
        );

        let mut context = ValidationContext::new();
        let mut history = Vec::new();
        let report = executor()
            .execute(&plan, &input(), &mut context, &mut history)
            .await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].issues()[0].check_name, "timeout");
        assert!(report.results[1].is_valid());
        assert!(report.has_critical);
    }

    #[tokio::test]
    async fn test_conditional_skips_on_invalid_dependency() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stage = PipelineStage::new("cond", ExecutionMode::Conditional)
            .with_checker(CheckerSpec::new("gate"))
            .with_checker(CheckerSpec::new("after_gate").depends_on("gate"))
            .with_checker(CheckerSpec::new("free"));
        let plan = plan(
            stage,
            vec![
                ("gate", observer(true, 0, &seen)),
                ("after_gate", observer(false, 0, &seen)),
                ("free", observer(false, 0, &seen)),
            ],
        );

        let exec = executor();
        let mut context = ValidationContext::new();
        let mut history = Vec::new();
        let report = exec.execute(&plan, &input(), &mut context, &mut history).await;

        assert_eq!(report.skipped, vec!["after_gate".to_string()]);
        let names: Vec<_> = report.results.iter().map(|r| r.checker_name.as_str()).collect();
        assert_eq!(names, vec!["gate", "free"]);
        assert_eq!(exec.metrics().snapshot().skipped, 1);
    }

    #[tokio::test]
    async fn test_conditional_skips_on_disabled_dependency() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stage = PipelineStage::new("cond", ExecutionMode::Conditional)
            .with_checker(CheckerSpec::new("off").disabled())
            .with_checker(CheckerSpec::new("needs_off").depends_on("off"));
        let plan = plan(stage, vec![("needs_off", observer(false, 0, &seen))]);

        let mut context = ValidationContext::new();
        let mut history = Vec::new();
        let report = executor()
            .execute(&plan, &input(), &mut context, &mut history)
            .await;

        assert!(report.results.is_empty());
        assert_eq!(report.skipped, vec!["needs_off".to_string()]);
    }

    #[test]
    fn test_continuation_policy() {
        let stage = PipelineStage::new("s", ExecutionMode::Sequential);
        let critical = StageReport {
            has_critical: true,
            ..Default::default()
        };
        assert!(critical.allows_continuation(&stage));
        assert!(!critical.allows_continuation(&stage.clone().stop_on_failure()));
        assert!(StageReport::default().allows_continuation(&stage.stop_on_failure()));
    }

    #[test]
    fn test_effective_timeout_fallback() {
        let stage = PipelineStage::new("s", ExecutionMode::Sequential);
        let fallback = Duration::from_secs(9);
        let spec = CheckerSpec::new("a");

        assert_eq!(effective_timeout(&spec, &stage, fallback), fallback);
        let stage = stage.with_timeout(Duration::from_secs(4));
        assert_eq!(effective_timeout(&spec, &stage, fallback), Duration::from_secs(4));
        let spec = spec.with_timeout(Duration::from_secs(1));
        assert_eq!(effective_timeout(&spec, &stage, fallback), Duration::from_secs(1));
    }

    /// Notes where each invocation's context lives.
    struct Addresses(Arc<Mutex<Vec<usize>>>);

    #[async_trait]
    impl Checker for Addresses {
        fn capabilities(&self) -> CheckerCapabilities {
            CheckerCapabilities::new("addresses")
        }

        async fn validate(
            &self,
            _input: &ValidationInput,
            ctx: &CheckerContext,
        ) -> Result<ValidationResult, CheckerError> {
            self.0
                .lock()
                .unwrap()
                .push(std::ptr::from_ref(ctx.context()) as usize);
            Ok(ctx.new_result())
        }
    }

    #[tokio::test]
    async fn test_sequential_stage_reuses_one_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stage = ["a", "b", "c", "d"].into_iter().fold(
            PipelineStage::new("seq", ExecutionMode::Sequential),
            |stage, name| stage.with_checker(CheckerSpec::new(name).with_checker("addresses")),
        );
        let checker: Arc<dyn Checker> = Arc::new(Addresses(Arc::clone(&seen)));
        let plan = plan(stage, vec![("addresses", checker)]);

        let mut context = ValidationContext::new().with_session_id("ses-cow");
        let mut history = Vec::new();
        let report = executor()
            .execute(&plan, &input(), &mut context, &mut history)
            .await;

        assert_eq!(report.results.len(), 4);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.windows(2).all(|w| w[0] == w[1]), "context was copied: {seen:?}");
        assert_eq!(context.session_id.as_str(), "ses-cow");
        assert_eq!(context.recorded_results(), 4);
        assert_eq!(history.len(), 4);
    }
}
