use anyhow::{bail, Result};
use futures::future::join_all;
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::{config::PipelineConfig, error::StageResult};

/// Uniform retry policy applied to every stage: a failed stage is re-run
/// up to `retries` more times, pausing `delay` between attempts. Re-runs
/// are safe because each stage overwrites its output wholesale.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

type StageFn = Arc<dyn Fn(&PipelineConfig) -> StageResult + Send + Sync>;

/// One unit of work: an identity, its predecessors, and a callable.
pub struct Stage {
    id: &'static str,
    deps: Vec<&'static str>,
    run: StageFn,
}

/// Final disposition of a stage within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Success,
    Failed(String),
    Skipped,
}

/// Per-stage outcome of a full graph run.
#[derive(Debug)]
pub struct RunReport {
    pub statuses: BTreeMap<&'static str, StageStatus>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.statuses
            .values()
            .all(|s| matches!(s, StageStatus::Success))
    }

    pub fn status(&self, id: &str) -> Option<&StageStatus> {
        self.statuses.get(id)
    }
}

/// A directed acyclic graph of stages executed in dependency waves.
///
/// Every stage whose predecessors have all succeeded runs concurrently on
/// the blocking pool; a stage that exhausts its retries marks all of its
/// transitive dependents `Skipped`.
pub struct TaskGraph {
    stages: Vec<Stage>,
    policy: RetryPolicy,
}

impl TaskGraph {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            stages: Vec::new(),
            policy,
        }
    }

    pub fn add_stage(
        &mut self,
        id: &'static str,
        deps: &[&'static str],
        run: impl Fn(&PipelineConfig) -> StageResult + Send + Sync + 'static,
    ) {
        self.stages.push(Stage {
            id,
            deps: deps.to_vec(),
            run: Arc::new(run),
        });
    }

    /// Reject duplicate ids, edges to unknown stages, and cycles before
    /// anything runs.
    fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for stage in &self.stages {
            if !ids.insert(stage.id) {
                bail!("duplicate stage id {:?}", stage.id);
            }
        }
        for stage in &self.stages {
            for dep in &stage.deps {
                if !ids.contains(dep) {
                    bail!("stage {:?} depends on unknown stage {:?}", stage.id, dep);
                }
            }
        }

        // Kahn's algorithm; anything left unvisited sits on a cycle.
        let mut indegree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for stage in &self.stages {
            indegree.entry(stage.id).or_insert(0);
            for dep in &stage.deps {
                *indegree.entry(stage.id).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(stage.id);
            }
        }
        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for next in dependents.get(id).into_iter().flatten() {
                let n = indegree.get_mut(next).expect("dependent must be known");
                *n -= 1;
                if *n == 0 {
                    queue.push_back(next);
                }
            }
        }
        if visited != self.stages.len() {
            bail!("task graph contains a dependency cycle");
        }
        Ok(())
    }

    /// Run the whole graph to completion and report every stage's status.
    /// The run itself only errs on a malformed graph; stage failures are
    /// carried in the report.
    pub async fn run(&self, config: &PipelineConfig) -> Result<RunReport> {
        self.validate()?;
        let mut statuses: BTreeMap<&'static str, StageStatus> = BTreeMap::new();

        while statuses.len() < self.stages.len() {
            let mut progressed = false;

            // Anything downstream of a failure never runs.
            let skipped: Vec<&'static str> = self
                .stages
                .iter()
                .filter(|s| !statuses.contains_key(s.id))
                .filter(|s| {
                    s.deps.iter().any(|d| {
                        matches!(
                            statuses.get(d),
                            Some(StageStatus::Failed(_)) | Some(StageStatus::Skipped)
                        )
                    })
                })
                .map(|s| s.id)
                .collect();
            for id in skipped {
                warn!(stage = id, "skipped: upstream failure");
                statuses.insert(id, StageStatus::Skipped);
                progressed = true;
            }

            let ready: Vec<&Stage> = self
                .stages
                .iter()
                .filter(|s| !statuses.contains_key(s.id))
                .filter(|s| {
                    s.deps
                        .iter()
                        .all(|d| matches!(statuses.get(d), Some(StageStatus::Success)))
                })
                .collect();

            if !ready.is_empty() {
                let wave = ready.iter().map(|stage| self.run_stage(stage, config));
                for (id, status) in join_all(wave).await {
                    statuses.insert(id, status);
                }
                progressed = true;
            }

            if !progressed && statuses.len() < self.stages.len() {
                bail!("task graph stalled; validate() should have caught this");
            }
        }

        Ok(RunReport { statuses })
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        config: &PipelineConfig,
    ) -> (&'static str, StageStatus) {
        let mut attempt: u32 = 0;
        loop {
            let run = Arc::clone(&stage.run);
            let cfg = config.clone();
            let start = Instant::now();
            // Stages are blocking file work; keep them off the async threads.
            let outcome = tokio::task::spawn_blocking(move || run(&cfg)).await;

            match outcome {
                Ok(Ok(())) => {
                    info!(stage = stage.id, elapsed = ?start.elapsed(), "stage complete");
                    return (stage.id, StageStatus::Success);
                }
                Ok(Err(err)) => {
                    if attempt < self.policy.retries {
                        attempt += 1;
                        warn!(stage = stage.id, %err, attempt, "stage failed; retrying");
                        sleep(self.policy.delay).await;
                        continue;
                    }
                    error!(stage = stage.id, %err, "stage failed");
                    return (stage.id, StageStatus::Failed(err.to_string()));
                }
                Err(join_err) => {
                    error!(stage = stage.id, "stage panicked: {join_err}");
                    return (stage.id, StageStatus::Failed(join_err.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            retries: 0,
            delay: Duration::from_secs(0),
        }
    }

    fn failing(id: &'static str) -> impl Fn(&PipelineConfig) -> StageResult {
        move |_| Err(StageError::input(id, "boom"))
    }

    #[tokio::test]
    async fn stages_run_in_dependency_order() -> Result<()> {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut graph = TaskGraph::new(no_retry());
        for (id, deps) in [
            ("first", vec![]),
            ("left", vec!["first"]),
            ("right", vec!["first"]),
            ("last", vec!["left", "right"]),
        ] {
            let order = Arc::clone(&order);
            graph.add_stage(id, &deps, move |_| {
                order.lock().unwrap().push(id);
                Ok(())
            });
        }

        let report = graph.run(&PipelineConfig::default()).await?;
        assert!(report.succeeded());

        let order = order.lock().unwrap();
        assert_eq!(order[0], "first");
        assert_eq!(order[3], "last");
        assert!(order[1..3].contains(&"left") && order[1..3].contains(&"right"));
        Ok(())
    }

    #[tokio::test]
    async fn dependents_of_a_failure_are_skipped() -> Result<()> {
        let mut graph = TaskGraph::new(no_retry());
        graph.add_stage("bad", &[], failing("bad"));
        graph.add_stage("child", &["bad"], |_| Ok(()));
        graph.add_stage("grandchild", &["child"], |_| Ok(()));
        graph.add_stage("bystander", &[], |_| Ok(()));

        let report = graph.run(&PipelineConfig::default()).await?;
        assert!(!report.succeeded());
        assert!(matches!(report.status("bad"), Some(StageStatus::Failed(_))));
        assert_eq!(report.status("child"), Some(&StageStatus::Skipped));
        assert_eq!(report.status("grandchild"), Some(&StageStatus::Skipped));
        assert_eq!(report.status("bystander"), Some(&StageStatus::Success));
        Ok(())
    }

    #[tokio::test]
    async fn retry_policy_reruns_a_flaky_stage() -> Result<()> {
        let attempts = Arc::new(AtomicU32::new(0));
        let mut graph = TaskGraph::new(RetryPolicy {
            retries: 1,
            delay: Duration::from_millis(0),
        });
        {
            let attempts = Arc::clone(&attempts);
            graph.add_stage("flaky", &[], move |_| {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StageError::input("flaky", "transient"))
                } else {
                    Ok(())
                }
            });
        }

        let report = graph.run(&PipelineConfig::default()).await?;
        assert!(report.succeeded());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let mut graph = TaskGraph::new(no_retry());
        graph.add_stage("twin", &[], |_| Ok(()));
        graph.add_stage("twin", &[], |_| Ok(()));
        assert!(graph.run(&PipelineConfig::default()).await.is_err());
    }

    #[tokio::test]
    async fn unknown_dependencies_are_rejected() {
        let mut graph = TaskGraph::new(no_retry());
        graph.add_stage("lonely", &["ghost"], |_| Ok(()));
        assert!(graph.run(&PipelineConfig::default()).await.is_err());
    }

    #[tokio::test]
    async fn cycles_are_rejected() {
        let mut graph = TaskGraph::new(no_retry());
        graph.add_stage("a", &["b"], |_| Ok(()));
        graph.add_stage("b", &["a"], |_| Ok(()));
        assert!(graph.run(&PipelineConfig::default()).await.is_err());
    }
}
