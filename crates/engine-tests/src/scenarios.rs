#[cfg(test)]
mod tests {
    use crate::utils::{
        BrokenChecker, HangingChecker, StaticChecker, fast_settings, run_log, signal_input,
    };
    use engine_config::PipelineDefinition;
    use engine_processing::resolver::resolve;
    use engine_runtime::{CheckerRegistry, Pipeline};
    use model::{
        CheckerSpec, ExecutionMode, PipelineStage, ResultStatus, Severity, ValidationContext,
        ValidationIssue,
    };
    use std::{sync::atomic::Ordering, time::Duration};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn dependency_chain_runs_in_order() {
        let stage = PipelineStage::new("structure", ExecutionMode::Sequential)
            .with_checker(CheckerSpec::new("C").depends_on("B"))
            .with_checker(CheckerSpec::new("A"))
            .with_checker(CheckerSpec::new("B").depends_on("A"));

        let order: Vec<_> = resolve(&stage)
            .unwrap()
            .into_iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(order, vec!["A", "B", "C"]);

        let log = run_log();
        let registry = CheckerRegistry::new()
            .with(StaticChecker::new("A").logging_to(&log))
            .with(StaticChecker::new("B").logging_to(&log))
            .with(StaticChecker::new("C").logging_to(&log));
        let pipeline = Pipeline::from_stages(vec![stage], &registry, fast_settings()).unwrap();

        let mut context = ValidationContext::new();
        let results = pipeline.execute(&signal_input(16, 8), &mut context).await;

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.status == ResultStatus::Completed));
        assert!(logs_contain("Starting validation pipeline"));
    }

    #[traced_test]
    #[tokio::test]
    async fn timeout_after_retry_budget_yields_one_issue() {
        let hanging = HangingChecker::new();
        let calls = hanging.calls.clone();
        let registry = CheckerRegistry::new().with(hanging);

        let stage = PipelineStage::new("slow", ExecutionMode::Sequential).with_checker(
            CheckerSpec::new("hanging")
                .with_timeout(Duration::from_millis(50))
                .with_retries(2),
        );
        let pipeline = Pipeline::from_stages(vec![stage], &registry, fast_settings()).unwrap();

        let mut context = ValidationContext::new();
        let report = pipeline
            .validate_and_aggregate(&signal_input(16, 8), &mut context)
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.critical_count(), 1);
        assert_eq!(report.total_issues, 1);
        let issue = &report.consolidated_issues[0];
        assert_eq!(issue.check_name, "timeout");
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.occurrence_count(), 1);
        assert!(!report.overall_status);
        assert!(logs_contain("Retrying checker"));
    }

    #[tokio::test]
    async fn parallel_duplicates_are_merged() {
        let registry = CheckerRegistry::new()
            .with(StaticChecker::new("units").reporting(ValidationIssue::warning(
                "missing_unit",
                "Channel channel1 has no unit attribute",
                "data.channel1",
            )))
            .with(StaticChecker::new("metadata").reporting(ValidationIssue::warning(
                "missing_unit",
                "channel channel1 has no unit attribute.",
                "data.channel1",
            )));

        let stage = PipelineStage::new("content", ExecutionMode::Parallel)
            .with_checker(CheckerSpec::new("units"))
            .with_checker(CheckerSpec::new("metadata"));
        let pipeline = Pipeline::from_stages(vec![stage], &registry, fast_settings()).unwrap();

        let mut context = ValidationContext::new();
        let report = pipeline
            .validate_and_aggregate(&signal_input(16, 8), &mut context)
            .await;

        assert_eq!(report.total_issues, 1);
        let merged = &report.consolidated_issues[0];
        assert_eq!(merged.check_name, "missing_unit");
        assert_eq!(merged.occurrence_count(), 2);
        assert!(merged.checker_name.contains("units"));
        assert!(merged.checker_name.contains("metadata"));
        assert_eq!(merged.details["checkers"].as_array().map(Vec::len), Some(2));
        assert_eq!(report.issues_by_checker["units"], 1);
        assert_eq!(report.issues_by_checker["metadata"], 1);
        assert!(report.overall_status, "warnings alone do not fail the run");
        assert!(report.is_consistent());
    }

    #[traced_test]
    #[tokio::test]
    async fn critical_issue_stops_later_stages() {
        let log = run_log();
        let registry = CheckerRegistry::new()
            .with(
                StaticChecker::new("header")
                    .reporting(ValidationIssue::critical("format", "not a valid file", "header"))
                    .logging_to(&log),
            )
            .with(StaticChecker::new("content").logging_to(&log));

        let definition = PipelineDefinition::from_json_str(
            r#"{
                "stages": [
                    {
                        "name": "format",
                        "execution_mode": "sequential",
                        "continue_on_failure": false,
                        "checkers": [{ "name": "header", "checker": "header" }]
                    },
                    {
                        "name": "content",
                        "execution_mode": "parallel",
                        "checkers": [{ "name": "content", "checker": "content" }]
                    }
                ]
            }"#,
        )
        .unwrap();
        let pipeline = Pipeline::new(definition, &registry, fast_settings()).unwrap();

        let mut context = ValidationContext::new();
        let outcome = pipeline
            .run(&signal_input(16, 8), &mut context, CancellationToken::new())
            .await;

        assert!(outcome.terminated_early);
        assert_eq!(outcome.stages_executed, 1);
        assert_eq!(*log.lock().unwrap(), vec!["header"]);

        let report = pipeline.aggregate(&outcome.results);
        assert!(!report.overall_status);
        assert_eq!(report.critical_count(), 1);
        assert!(report.recommendations[0].contains("critical"));
    }

    #[tokio::test]
    async fn failures_become_issues_not_errors() {
        let registry = CheckerRegistry::new()
            .with(BrokenChecker { panics: false })
            .with(BrokenChecker { panics: true })
            .with(StaticChecker::new("fine"));

        let stage = PipelineStage::new("mixed", ExecutionMode::Parallel)
            .with_checker(CheckerSpec::new("failing"))
            .with_checker(CheckerSpec::new("panicking"))
            .with_checker(CheckerSpec::new("fine"));
        let pipeline = Pipeline::from_stages(vec![stage], &registry, fast_settings()).unwrap();

        let mut context = ValidationContext::new();
        let results = pipeline.execute(&signal_input(16, 8), &mut context).await;
        assert_eq!(results.len(), 3);

        let checks: Vec<_> = results
            .iter()
            .map(|r| r.issues().first().map(|i| i.check_name.as_str()))
            .collect();
        assert_eq!(
            checks,
            vec![Some("checker_failure"), Some("checker_panic"), None]
        );

        let report = pipeline.aggregate(&results);
        assert_eq!(report.critical_count(), 2);
        assert_eq!(report.quality_score("checker_success_rate"), Some(1.0 / 3.0));
    }

    #[tokio::test]
    async fn conditional_stage_skips_dependents_of_failures() {
        let log = run_log();
        let registry = CheckerRegistry::new()
            .with(
                StaticChecker::new("schema")
                    .reporting(ValidationIssue::critical("schema", "missing group", "root"))
                    .logging_to(&log),
            )
            .with(StaticChecker::new("units").logging_to(&log))
            .with(StaticChecker::new("naming").logging_to(&log));

        let stage = PipelineStage::new("checks", ExecutionMode::Conditional)
            .with_checker(CheckerSpec::new("schema"))
            .with_checker(CheckerSpec::new("units").depends_on("schema"))
            .with_checker(CheckerSpec::new("naming"));
        let pipeline = Pipeline::from_stages(vec![stage], &registry, fast_settings()).unwrap();

        let mut context = ValidationContext::new();
        let outcome = pipeline
            .run(&signal_input(16, 8), &mut context, CancellationToken::new())
            .await;

        assert_eq!(*log.lock().unwrap(), vec!["schema", "naming"]);
        assert_eq!(outcome.metrics.skipped, 1);
        assert_eq!(outcome.results.len(), 2);
    }

    #[tokio::test]
    async fn cancelling_mid_run_reports_cancelled_checker() {
        let registry = CheckerRegistry::new()
            .with(HangingChecker::new())
            .with(StaticChecker::new("after"));
        let stages = vec![
            PipelineStage::new("first", ExecutionMode::Sequential)
                .with_checker(CheckerSpec::new("hanging").with_retries(3)),
            PipelineStage::new("second", ExecutionMode::Sequential)
                .with_checker(CheckerSpec::new("after")),
        ];
        let pipeline = Pipeline::from_stages(stages, &registry, fast_settings()).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut context = ValidationContext::new();
        let outcome = pipeline.run(&signal_input(16, 8), &mut context, cancel).await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].status, ResultStatus::Cancelled);
        assert_eq!(outcome.results[0].issues()[0].check_name, "cancelled");
        assert_eq!(outcome.metrics.retries, 0);
    }
}
