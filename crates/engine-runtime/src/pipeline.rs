use crate::{error::PipelineError, registry::CheckerRegistry};
use engine_config::{EngineSettings, PipelineDefinition};
use engine_core::{
    metrics::{Metrics, MetricsSnapshot},
    source::ValidationInput,
};
use engine_processing::{ResultsAggregator, StageExecutor, StagePlan};
use model::{AggregatedResult, PipelineStage, ValidationContext, ValidationResult};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything one run produced, plus bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// All results in the order they were recorded.
    pub results: Vec<ValidationResult>,
    pub stages_executed: usize,
    /// A stage with `continue_on_failure = false` reported a critical issue.
    pub terminated_early: bool,
    pub cancelled: bool,
    pub metrics: MetricsSnapshot,
}

/// A validated, fully resolved pipeline bound to its checkers.
///
/// All configuration problems surface from [`Pipeline::new`]. Running the
/// pipeline never fails: checker errors, panics, timeouts and memory
/// exhaustion are all reported as critical issues in the results.
#[derive(Debug, Clone)]
pub struct Pipeline {
    plans: Vec<StagePlan>,
    settings: Arc<EngineSettings>,
    aggregator: ResultsAggregator,
}

impl Pipeline {
    pub fn new(
        definition: PipelineDefinition,
        registry: &CheckerRegistry,
        settings: EngineSettings,
    ) -> Result<Self, PipelineError> {
        settings.validate()?;
        definition.validate()?;

        let plans = definition
            .stages
            .into_iter()
            .map(|stage| {
                let name = stage.name.clone();
                StagePlan::new(stage, |key| registry.get(key)).map_err(|source| {
                    warn!(stage = %name, error = %source, "Rejecting pipeline configuration");
                    PipelineError::Resolve { stage: name, source }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            plans,
            aggregator: ResultsAggregator::new(settings.aggregation.clone()),
            settings: Arc::new(settings),
        })
    }

    pub fn from_stages(
        stages: Vec<PipelineStage>,
        registry: &CheckerRegistry,
        settings: EngineSettings,
    ) -> Result<Self, PipelineError> {
        Self::new(PipelineDefinition::new(stages), registry, settings)
    }

    pub fn stages(&self) -> &[StagePlan] {
        &self.plans
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs every stage and returns all results.
    pub async fn execute(
        &self,
        input: &ValidationInput,
        context: &mut ValidationContext,
    ) -> Vec<ValidationResult> {
        self.run(input, context, CancellationToken::new())
            .await
            .results
    }

    /// Like [`Pipeline::execute`], stopping when `cancel` fires. In-flight
    /// checkers are reported as cancelled and no further stage starts.
    pub async fn execute_with_cancel(
        &self,
        input: &ValidationInput,
        context: &mut ValidationContext,
        cancel: CancellationToken,
    ) -> Vec<ValidationResult> {
        self.run(input, context, cancel).await.results
    }

    pub async fn run(
        &self,
        input: &ValidationInput,
        context: &mut ValidationContext,
        cancel: CancellationToken,
    ) -> PipelineOutcome {
        let metrics = Metrics::new();
        let executor = StageExecutor::new(Arc::clone(&self.settings), metrics.clone(), cancel.clone());
        let mut history = Vec::new();
        let mut stages_executed = 0;
        let mut terminated_early = false;

        info!(
            session = %context.session_id,
            stages = self.plans.len(),
            dataset = %input.descriptor().dataset,
            "Starting validation pipeline"
        );

        for plan in &self.plans {
            if cancel.is_cancelled() {
                warn!(stage = plan.name(), "Run cancelled before stage");
                break;
            }

            let report = executor.execute(plan, input, context, &mut history).await;
            stages_executed += 1;

            if !report.allows_continuation(plan.stage()) {
                warn!(
                    stage = plan.name(),
                    "Critical issue in a stage that does not continue on failure, stopping run"
                );
                terminated_early = true;
                break;
            }
        }

        let cancelled = cancel.is_cancelled();
        let metrics = metrics.snapshot();
        info!(
            session = %context.session_id,
            results = history.len(),
            stages_executed,
            terminated_early,
            cancelled,
            invocations = metrics.invocations,
            "Validation pipeline finished"
        );

        PipelineOutcome {
            results: history,
            stages_executed,
            terminated_early,
            cancelled,
            metrics,
        }
    }

    /// Blocking wrapper around [`Pipeline::execute`] on a current-thread
    /// runtime. Must not be called from inside a tokio runtime.
    pub fn execute_blocking(
        &self,
        input: &ValidationInput,
        context: &mut ValidationContext,
    ) -> Result<Vec<ValidationResult>, PipelineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.execute(input, context)))
    }

    pub fn aggregate(&self, results: &[ValidationResult]) -> AggregatedResult {
        self.aggregator.aggregate(results)
    }

    pub async fn validate_and_aggregate(
        &self,
        input: &ValidationInput,
        context: &mut ValidationContext,
    ) -> AggregatedResult {
        let results = self.execute(input, context).await;
        self.aggregate(&results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_config::ConfigError;
    use engine_core::{
        checker::{Checker, CheckerCapabilities, CheckerContext},
        error::CheckerError,
        source::{InMemorySource, SourceDescriptor},
    };
    use engine_processing::ResolveError;
    use model::{CheckerSpec, ExecutionMode, ValidationIssue};
    use tracing_test::traced_test;

    struct Fixed {
        name: &'static str,
        critical: bool,
    }

    #[async_trait]
    impl Checker for Fixed {
        fn capabilities(&self) -> CheckerCapabilities {
            CheckerCapabilities::new(self.name)
        }

        async fn validate(
            &self,
            _input: &ValidationInput,
            ctx: &CheckerContext,
        ) -> Result<ValidationResult, CheckerError> {
            let mut result = ctx.new_result();
            if self.critical {
                result.push_issue(ValidationIssue::critical("structure", "bad header", "header"));
            }
            Ok(result)
        }
    }

    fn registry() -> CheckerRegistry {
        CheckerRegistry::new()
            .with(Fixed { name: "ok", critical: false })
            .with(Fixed { name: "bad", critical: true })
    }

    fn input() -> ValidationInput {
        ValidationInput::from_source(InMemorySource::zeroed(SourceDescriptor::new(
            "data",
            vec![4],
            "u8",
            1,
        )))
    }

    #[test]
    fn test_unknown_implementation_is_a_config_error() {
        let stages = vec![
            PipelineStage::new("s", ExecutionMode::Sequential).with_checker(CheckerSpec::new("nope")),
        ];
        let err = Pipeline::from_stages(stages, &registry(), EngineSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Resolve {
                source: ResolveError::UnknownImplementation { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_cycle_is_a_config_error() {
        let stages = vec![
            PipelineStage::new("s", ExecutionMode::Sequential)
                .with_checker(CheckerSpec::new("a").with_checker("ok").depends_on("b"))
                .with_checker(CheckerSpec::new("b").with_checker("ok").depends_on("a")),
        ];
        let err = Pipeline::from_stages(stages, &registry(), EngineSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Resolve {
                source: ResolveError::Cycle { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut settings = EngineSettings::default();
        settings.executor.default_timeout_ms = 0;
        let err = Pipeline::from_stages(Vec::new(), &registry(), settings).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::InvalidSetting { .. })));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_stop_on_failure_ends_run() {
        let stages = vec![
            PipelineStage::new("first", ExecutionMode::Sequential)
                .stop_on_failure()
                .with_checker(CheckerSpec::new("bad")),
            PipelineStage::new("second", ExecutionMode::Sequential).with_checker(CheckerSpec::new("ok")),
        ];
        let pipeline = Pipeline::from_stages(stages, &registry(), EngineSettings::default()).unwrap();

        let mut context = ValidationContext::new();
        let outcome = pipeline
            .run(&input(), &mut context, CancellationToken::new())
            .await;

        assert_eq!(outcome.stages_executed, 1);
        assert!(outcome.terminated_early);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.metrics.invocations, 1);
        assert!(logs_contain("stopping run"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let stages = vec![
            PipelineStage::new("only", ExecutionMode::Sequential).with_checker(CheckerSpec::new("ok")),
        ];
        let pipeline = Pipeline::from_stages(stages, &registry(), EngineSettings::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut context = ValidationContext::new();
        let outcome = pipeline.run(&input(), &mut context, cancel).await;
        assert!(outcome.cancelled);
        assert_eq!(outcome.stages_executed, 0);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_execute_blocking() {
        let stages = vec![
            PipelineStage::new("only", ExecutionMode::Parallel)
                .with_checker(CheckerSpec::new("ok"))
                .with_checker(CheckerSpec::new("also_ok").with_checker("ok")),
        ];
        let pipeline = Pipeline::from_stages(stages, &registry(), EngineSettings::default()).unwrap();

        let mut context = ValidationContext::new();
        let results = pipeline.execute_blocking(&input(), &mut context).unwrap();
        assert_eq!(results.len(), 2);

        let report = pipeline.aggregate(&results);
        assert!(report.overall_status);
        assert_eq!(report.total_issues, 0);
        assert_eq!(context.recorded_results(), 2);
    }
}
