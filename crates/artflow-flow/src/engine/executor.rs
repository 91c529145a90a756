//! Flow execution.

use std::sync::Arc;

use futures::future::{BoxFuture, try_join_all};
use futures::{FutureExt, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::result::Failure;
use super::{FailurePolicy, Lineage, RunConfig, RunResult};
use crate::TRACING_TARGET;
use crate::error::{FlowError, FlowResult};
use crate::flow::Flow;
use crate::record::Record;
use crate::step::{Extent, Step};

/// What became of one record after it went through part of a flow.
#[derive(Debug)]
enum Outcome {
    /// The record left the node along the given path, relative to the node.
    Finished { path: usize, lineage: Lineage },
    /// The record failed inside the node.
    Failed(Failure),
}

impl Outcome {
    fn offset(self, by: usize) -> Self {
        match self {
            Self::Finished { path, lineage } => Self::Finished {
                path: path + by,
                lineage,
            },
            failed => failed,
        }
    }
}

/// Runs flows over input records.
///
/// Every input record runs concurrently; the number of step calls in flight
/// at once is bounded across all records of a run.
pub struct Runner {
    config: RunConfig,
    semaphore: Arc<Semaphore>,
}

impl Runner {
    /// Creates a new runner with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Config`] if a limit is zero or exceeds what the
    /// concurrency bound can represent.
    pub fn new(config: RunConfig) -> FlowResult<Self> {
        config.validate()?;
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_calls));

        tracing::debug!(
            target: TRACING_TARGET,
            failure_policy = %config.failure_policy,
            max_concurrent_calls = config.max_concurrent_calls,
            unbounded_limit = config.unbounded_limit,
            "Flow runner initialized"
        );

        Ok(Self { config, semaphore })
    }

    /// Returns the runner configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the flow over every input record.
    ///
    /// The flow is validated before any record is processed. Per-record
    /// failures are handled according to the configured [`FailurePolicy`].
    pub async fn run<I>(&self, flow: &Flow, inputs: I) -> FlowResult<RunResult>
    where
        I: IntoIterator<Item = Record>,
    {
        flow.validate()?;

        let run_id = Uuid::now_v7();
        let paths = flow.paths();

        let runs: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| self.execute(flow, Lineage::new(index, input)))
            .collect();

        tracing::info!(
            target: TRACING_TARGET,
            run_id = %run_id,
            inputs = runs.len(),
            paths = paths.len(),
            "Starting flow run"
        );

        let outcomes = try_join_all(runs).await.inspect_err(|error| {
            tracing::error!(
                target: TRACING_TARGET,
                run_id = %run_id,
                error = %error,
                "Flow run aborted"
            );
        })?;

        let mut outputs: Vec<Vec<Lineage>> = vec![Vec::new(); paths.len()];
        let mut failures = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Outcome::Finished { path, lineage } => match outputs.get_mut(path) {
                    Some(bucket) => bucket.push(lineage),
                    None => {
                        return Err(FlowError::internal(format!(
                            "path index {path} out of range for {} paths",
                            paths.len()
                        )));
                    }
                },
                Outcome::Failed(failure) => failures.push(failure),
            }
        }

        let result = RunResult::new(run_id, paths, outputs, failures);

        tracing::info!(
            target: TRACING_TARGET,
            run_id = %run_id,
            finalized = result.len(),
            failed = result.failures().len(),
            "Flow run completed"
        );

        Ok(result)
    }

    fn execute<'a>(
        &'a self,
        flow: &'a Flow,
        lineage: Lineage,
    ) -> BoxFuture<'a, FlowResult<Vec<Outcome>>> {
        async move {
            match flow {
                Flow::Step(step) => self.execute_step(step, lineage).await,
                Flow::Passthrough => Ok(vec![Outcome::Finished { path: 0, lineage }]),
                Flow::Chain(nodes) => self.execute_chain(nodes, lineage).await,
                Flow::Parallel(branches) => self.execute_parallel(branches, lineage).await,
            }
        }
        .boxed()
    }

    /// Sends every record emitted by the first node through the rest.
    ///
    /// Path `i` of the head followed by path `j` of the tail has index
    /// `i * tail_paths + j`.
    fn execute_chain<'a>(
        &'a self,
        nodes: &'a [Flow],
        lineage: Lineage,
    ) -> BoxFuture<'a, FlowResult<Vec<Outcome>>> {
        async move {
            let Some((head, tail)) = nodes.split_first() else {
                return Ok(vec![Outcome::Finished { path: 0, lineage }]);
            };

            let outcomes = self.execute(head, lineage).await?;
            if tail.is_empty() {
                return Ok(outcomes);
            }

            let tail_paths: usize = tail.iter().map(Flow::path_count).product();
            let continuations = outcomes.into_iter().map(move |outcome| async move {
                match outcome {
                    Outcome::Finished { path, lineage } => {
                        let outcomes = self.execute_chain(tail, lineage).await?;
                        FlowResult::Ok(
                            outcomes
                                .into_iter()
                                .map(|outcome| outcome.offset(path * tail_paths))
                                .collect::<Vec<_>>(),
                        )
                    }
                    failed => FlowResult::Ok(vec![failed]),
                }
            });

            let outcomes: Vec<Vec<Outcome>> = try_join_all(continuations).await?;
            Ok(outcomes.into_iter().flatten().collect())
        }
        .boxed()
    }

    /// Runs every branch on the same lineage and concatenates the outcomes
    /// in branch order.
    async fn execute_parallel(
        &self,
        branches: &[Flow],
        lineage: Lineage,
    ) -> FlowResult<Vec<Outcome>> {
        let mut offset = 0;
        let mut runs = Vec::with_capacity(branches.len());
        for branch in branches {
            let branch_offset = offset;
            offset += branch.path_count();
            let run = self.execute(branch, lineage.clone());
            runs.push(async move {
                let outcomes = run.await?;
                FlowResult::Ok(
                    outcomes
                        .into_iter()
                        .map(|outcome| outcome.offset(branch_offset))
                        .collect::<Vec<_>>(),
                )
            });
        }

        let outcomes = try_join_all(runs).await?;
        Ok(outcomes.into_iter().flatten().collect())
    }

    async fn execute_step(&self, step: &Step, lineage: Lineage) -> FlowResult<Vec<Outcome>> {
        let fields = lineage.fields();
        let args = match step.resolve(&fields) {
            Ok(args) => args,
            Err(error) => return self.fail(Vec::new(), lineage, error),
        };

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| FlowError::internal(format!("semaphore closed: {e}")))?;

        tracing::trace!(
            target: TRACING_TARGET,
            step = step.name(),
            input_index = lineage.input_index(),
            "Invoking step"
        );

        let products = match step.call(args).await {
            Ok(products) => products,
            Err(error) => {
                let error = FlowError::execution(step.name(), fields, error);
                return self.fail(Vec::new(), lineage, error);
            }
        };

        let extent = products.extent();
        let mut stream = products.into_stream();
        let mut outcomes = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(record) => outcomes.push(Outcome::Finished {
                    path: 0,
                    lineage: lineage.extend(step.name(), record),
                }),
                Err(error) => {
                    let error = FlowError::execution(step.name(), fields, error);
                    return self.fail(outcomes, lineage, error);
                }
            }

            if extent == Extent::Unbounded && outcomes.len() >= self.config.unbounded_limit {
                tracing::warn!(
                    target: TRACING_TARGET,
                    step = step.name(),
                    limit = self.config.unbounded_limit,
                    "Unbounded product stream truncated"
                );
                break;
            }
        }

        Ok(outcomes)
    }

    /// Applies the failure policy to a failed record.
    fn fail(
        &self,
        mut outcomes: Vec<Outcome>,
        lineage: Lineage,
        error: FlowError,
    ) -> FlowResult<Vec<Outcome>> {
        match self.config.failure_policy {
            FailurePolicy::Abort => Err(error),
            FailurePolicy::Isolate => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    step = error.step().unwrap_or_default(),
                    input_index = lineage.input_index(),
                    error = %error,
                    "Record failed"
                );
                outcomes.push(Outcome::Failed(Failure::new(lineage, error)));
                Ok(outcomes)
            }
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Runs the flow over every input record with the default configuration.
pub async fn run<I>(flow: &Flow, inputs: I) -> FlowResult<RunResult>
where
    I: IntoIterator<Item = Record>,
{
    Runner::new(RunConfig::default())?.run(flow, inputs).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::flow::passthrough;
    use crate::record;
    use crate::step::{Arguments, Products, step, step_fn, step_stream};

    fn double() -> Step {
        step_fn("double", |args: Arguments| {
            let x: i64 = args.get("x")?;
            Ok(record! { "y" => x * 2 })
        })
        .require(["x"])
    }

    fn abort() -> Runner {
        Runner::new(RunConfig::default().with_failure_policy(FailurePolicy::Abort)).unwrap()
    }

    #[tokio::test]
    async fn single_step_extends_input() {
        let result = run(&Flow::from(double()), [record! { "x" => 3 }]).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.paths(), [vec!["double".to_owned()]]);
        assert_eq!(
            Value::from(result.outputs(0)[0].to_record()),
            json!({ "x": 3, "double": { "y": 6 } })
        );
    }

    #[tokio::test]
    async fn chain_expands_each_product() {
        let split = step_fn("a", |args: Arguments| {
            let x: i64 = args.get("x")?;
            Ok(vec![record! { "v" => x }, record! { "v" => x + 1 }])
        })
        .require(["x"]);
        let scale = step_fn("b", |args: Arguments| {
            let v: i64 = args.get("v")?;
            Ok(record! { "w" => v * 10 })
        })
        .require(["v"]);

        let result = run(&(split >> scale), [record! { "x" => 1 }]).await.unwrap();
        let outputs = result.outputs(0);

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].input(), outputs[1].input());
        assert_eq!(outputs[0].get("a"), Some(&record! { "v" => 1 }));
        assert_eq!(outputs[1].get("a"), Some(&record! { "v" => 2 }));
        assert_eq!(outputs[1].get("b"), Some(&record! { "w" => 20 }));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_concatenates_in_branch_order() {
        let slow = step("p1", |_args: Arguments| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(record! { "from" => "p1" })
        });
        let fast = step("p2", |_args: Arguments| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(record! { "from" => "p2" })
        });

        let result = run(&(slow & fast), [record! { "x" => 1 }]).await.unwrap();
        let sources: Vec<_> = result
            .lineages()
            .map(|lineage| lineage.last().get("from").cloned())
            .collect();

        assert_eq!(sources, [Some(json!("p1")), Some(json!("p2"))]);
        assert_eq!(result.outputs(0)[0].input_index(), 0);
        assert_eq!(result.outputs(1)[0].input(), &record! { "x" => 1 });
    }

    #[tokio::test]
    async fn missing_field_names_step_and_field() {
        let judge = step_fn("judge", |_args: Arguments| Ok(None::<Record>)).require(["metric"]);
        let flow = Flow::from(judge);

        let result = run(&flow, [record! { "x" => 1 }]).await.unwrap();
        assert!(result.is_empty());
        match result.failures()[0].error() {
            FlowError::MissingField { step, field, .. } => {
                assert_eq!(step, "judge");
                assert_eq!(field, "metric");
            }
            other => panic!("unexpected error: {other}"),
        }

        let error = abort().run(&flow, [record! { "x" => 1 }]).await.unwrap_err();
        assert!(matches!(error, FlowError::MissingField { .. }));
    }

    #[tokio::test]
    async fn failing_record_does_not_stop_siblings() {
        let score = step_fn("score", |args: Arguments| {
            let x: i64 = args.get("x")?;
            anyhow::ensure!(x != 2, "cannot score {x}");
            Ok(record! { "score" => x })
        })
        .require(["x"]);
        let inputs = (1..=3).map(|x| record! { "x" => x });

        let result = run(&Flow::from(score), inputs).await.unwrap();

        assert_eq!(result.len(), 2);
        let failure = &result.failures()[0];
        assert_eq!(failure.step(), Some("score"));
        assert_eq!(failure.input_index(), 1);
        assert_eq!(failure.error().record(), Some(&record! { "x" => 2 }));
        assert!(failure.error().to_string().contains("cannot score 2"));
    }

    #[tokio::test]
    async fn abort_policy_fails_the_run() {
        let fail = step_fn("fail", |_args: Arguments| -> anyhow::Result<Record> {
            anyhow::bail!("boom")
        });

        let error = abort().run(&Flow::from(fail), [record! {}]).await.unwrap_err();
        assert_eq!(error.step(), Some("fail"));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_policy_cancels_in_flight_work() {
        let completed = Arc::new(AtomicUsize::new(0));
        let slow = |name: &'static str| {
            let completed = Arc::clone(&completed);
            step(name, move |args: Arguments| {
                let completed = Arc::clone(&completed);
                async move {
                    let x: i64 = args.get("x")?;
                    anyhow::ensure!(x != 0, "rejected {x}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(record! { "x" => x })
                }
            })
            .require(["x"])
        };

        let flow = slow("check") & slow("judge");
        let inputs = [record! { "x" => 0 }, record! { "x" => 1 }];
        let error = abort().run(&flow, inputs).await.unwrap_err();
        assert!(error.to_string().contains("rejected 0"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn runner_rejects_deserialized_zero_limits() {
        let config: RunConfig = serde_json::from_str(r#"{"max_concurrent_calls":0}"#).unwrap();
        let error = Runner::new(config).unwrap_err();
        assert!(matches!(error, FlowError::Config(_)));
    }

    #[tokio::test]
    async fn later_steps_see_all_earlier_fields() {
        let a = step_fn("a", |_args: Arguments| Ok(record! { "y" => 2, "x" => 10 }));
        let b = step_fn("b", |args: Arguments| Ok(args.into_record())).variadic();

        let result = run(&(a >> b), [record! { "x" => 1, "z" => 0 }]).await.unwrap();
        let seen = result.outputs(0)[0].get("b").cloned().unwrap();

        assert_eq!(seen, record! { "x" => 10, "z" => 0, "y" => 2 });
    }

    #[tokio::test]
    async fn passthrough_forwards_lineage() {
        let add = |name: &'static str| {
            step_fn(name, move |args: Arguments| {
                let x: i64 = args.get("x")?;
                Ok(record! { "x" => x + 1 })
            })
            .require(["x"])
        };

        let flow = add("a") >> (add("b") & passthrough()) >> add("c");
        let result = run(&flow, [record! { "x" => 0 }]).await.unwrap();

        assert_eq!(result.outputs(0)[0].last(), &record! { "x" => 3 });
        assert_eq!(result.outputs(1)[0].last(), &record! { "x" => 2 });

        for (index, path) in result.paths().iter().enumerate() {
            for lineage in result.outputs(index) {
                assert_eq!(lineage.steps()[0], crate::INPUT_STEP);
                assert_eq!(lineage.steps()[1..], path[..]);
            }
        }
    }

    #[tokio::test]
    async fn runs_are_deterministic() {
        let inc = step_fn("inc", |args: Arguments| {
            let y: i64 = args.get("y")?;
            Ok(vec![record! { "z" => y + 1 }, record! { "z" => y + 2 }])
        })
        .require(["y"]);
        let flow = double() >> (inc & passthrough());
        let inputs = || (0..5).map(|x| record! { "x" => x });

        let first = run(&flow, inputs()).await.unwrap();
        let second = run(&flow, inputs()).await.unwrap();

        assert_eq!(first.records(), second.records());
        assert_eq!(first.outputs(0).len(), 10);
        assert_eq!(first.outputs(1).len(), 5);
    }

    #[tokio::test]
    async fn unbounded_streams_are_truncated() {
        let counter = step_fn("count", |_args: Arguments| {
            let stream = futures::stream::iter(0..).map(|i| Ok(record! { "i" => i }));
            Ok(Products::unbounded(stream))
        });
        let config = RunConfig::builder().unbounded_limit(5usize).build().unwrap();
        let runner = Runner::new(config).unwrap();

        let result = runner.run(&Flow::from(counter), [record! {}]).await.unwrap();
        assert_eq!(result.len(), 5);
    }

    #[tokio::test]
    async fn stream_error_keeps_earlier_products() {
        let emit = step_stream("emit", |_args: Arguments| {
            futures::stream::iter([
                Ok(record! { "i" => 0 }),
                Ok(record! { "i" => 1 }),
                Err(anyhow::anyhow!("stream broke")),
                Ok(record! { "i" => 3 }),
            ])
        });

        let result = run(&Flow::from(emit), [record! {}]).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.failures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_are_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let work = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            step("work", move |_args: Arguments| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(record! {})
                }
            })
        };

        let config = RunConfig::builder().max_concurrent_calls(2usize).build().unwrap();
        let runner = Runner::new(config).unwrap();
        let result = runner
            .run(&Flow::from(work), (0..6).map(|i| record! { "i" => i }))
            .await
            .unwrap();

        assert_eq!(result.len(), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_flow_runs_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = |name: &'static str| {
            let calls = Arc::clone(&calls);
            step_fn(name, move |_args: Arguments| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(record! {})
            })
        };

        let flow = counted("a") >> counted("a");
        let error = run(&flow, [record! {}]).await.unwrap_err();

        assert!(matches!(error, FlowError::Composition(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bound_arguments_take_precedence() {
        let threshold = step_fn("check", |args: Arguments| {
            let threshold: f64 = args.get("threshold")?;
            Ok(record! { "threshold" => threshold })
        })
        .require(["threshold"])
        .bind("threshold", 0.9);

        let result = run(&Flow::from(threshold), [record! { "threshold" => 0.1 }])
            .await
            .unwrap();
        assert_eq!(
            result.outputs(0)[0].last(),
            &record! { "threshold" => 0.9 }
        );
    }
}
