//! Task graph of stages and its fan-out/fan-in runner.
//!
//! The graph is validated when it is built: stage ids are unique, every
//! dependency names a stage in the graph, and there are no cycles. Stages are
//! then grouped into waves (Kahn's algorithm, one level per wave). A wave
//! starts once the previous one has fully finished and runs all its stages
//! concurrently.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use futures::future::try_join_all;
use tracing::{info, info_span, warn, Instrument};

use super::context::{StageInput, StageResults};
use super::trace::{Trace, TraceEvent};
use super::{Stage, StageId, StageOutput};
use crate::error::{Error, Result};

struct Node {
    stage: Box<dyn Stage>,
    dependencies: Vec<StageId>,
}

/// A validated DAG of stages.
pub struct TaskGraph {
    nodes: Vec<Node>,
    /// Node indices grouped by dependency level
    waves: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Validate the stages and compute their execution waves.
    pub fn build(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let nodes: Vec<Node> = stages
            .into_iter()
            .map(|stage| Node {
                dependencies: stage.dependencies(),
                stage,
            })
            .collect();

        let mut index = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.stage.id(), i).is_some() {
                return Err(Error::Graph(format!(
                    "stage {} is registered twice",
                    node.stage.id()
                )));
            }
        }

        let mut in_degree = vec![0usize; nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            let unique: HashSet<_> = node.dependencies.iter().collect();
            for dep in unique {
                let &d = index.get(dep).ok_or_else(|| {
                    Error::Graph(format!(
                        "stage {} depends on unknown stage {dep}",
                        node.stage.id()
                    ))
                })?;
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut waves = Vec::new();
        let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut scheduled = 0;
        while !ready.is_empty() {
            let mut next = Vec::new();
            for &i in &ready {
                for &j in &dependents[i] {
                    in_degree[j] -= 1;
                    if in_degree[j] == 0 {
                        next.push(j);
                    }
                }
            }
            scheduled += ready.len();
            waves.push(std::mem::replace(&mut ready, next));
        }

        if scheduled != nodes.len() {
            let stuck: Vec<String> = (0..nodes.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| nodes[i].stage.id().to_string())
                .collect();
            return Err(Error::Graph(format!(
                "dependency cycle between stages: {}",
                stuck.join(", ")
            )));
        }

        Ok(Self { nodes, waves })
    }

    /// Stage ids per wave, in execution order.
    pub fn waves(&self) -> Vec<Vec<StageId>> {
        self.waves
            .iter()
            .map(|wave| wave.iter().map(|&i| self.nodes[i].stage.id()).collect())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run every stage against `text`. The first stage failure fails the run
    /// and cancels the stages still running in its wave.
    pub async fn run(&self, text: &str, trace: &Trace) -> Result<StageResults> {
        let mut results = StageResults::new();

        for wave in &self.waves {
            let outputs = {
                let results = &results;
                try_join_all(
                    wave.iter()
                        .map(|&i| run_node(&self.nodes[i], text, results, trace)),
                )
                .await?
            };

            for (stage, output) in outputs {
                results.insert(stage, output)?;
            }
        }

        Ok(results)
    }
}

async fn run_node(
    node: &Node,
    text: &str,
    results: &StageResults,
    trace: &Trace,
) -> Result<(StageId, StageOutput)> {
    let id = node.stage.id();
    let span = info_span!("stage", stage = %id, author = id.agent_name());

    async {
        trace.record(TraceEvent::stage_start(id));
        info!("stage started");
        let started = Instant::now();

        let input = StageInput::new(id, text, &node.dependencies, results, trace);
        let outcome = node.stage.run(input).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                trace.record(TraceEvent::stage_end(id, duration_ms));
                info!(duration_ms, "stage finished");
                Ok((id, output))
            }
            Err(e) => {
                trace.record(TraceEvent::stage_error(id, duration_ms, &e));
                warn!(duration_ms, error = %e, "stage failed");
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::trace::TraceEventType;
    use crate::report::{Claim, Conclusion, Report};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    struct TestStage {
        id: StageId,
        deps: Vec<StageId>,
        barrier: Option<Arc<Barrier>>,
        fail: bool,
    }

    impl TestStage {
        fn new(id: StageId, deps: &[StageId]) -> Self {
            Self {
                id,
                deps: deps.to_vec(),
                barrier: None,
                fail: false,
            }
        }

        fn boxed(self) -> Box<dyn Stage> {
            Box::new(self)
        }
    }

    #[async_trait]
    impl Stage for TestStage {
        fn id(&self) -> StageId {
            self.id
        }

        fn dependencies(&self) -> Vec<StageId> {
            self.deps.clone()
        }

        async fn run(&self, input: StageInput<'_>) -> Result<StageOutput> {
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if self.fail {
                return Err(Error::tool("google_search", "quota exceeded"));
            }
            Ok(match self.id {
                StageId::ClaimsExtractor => StageOutput::Claims(Claim::from_texts([input.text()])),
                StageId::WebScraper => {
                    input.claims()?;
                    StageOutput::ScrapedEvidence(Vec::new())
                }
                StageId::FactChecker => {
                    input.claims()?;
                    StageOutput::FactCheckResults(Vec::new())
                }
                StageId::ReportGenerator => {
                    // both research outputs must be visible here
                    input.scraped_evidence()?;
                    input.fact_check_results()?;
                    StageOutput::FinalReport(Report {
                        analyzed_claims: Vec::new(),
                        tag: Conclusion::Unverified,
                        overall_summary: String::new(),
                    })
                }
            })
        }
    }

    fn standard_stages() -> Vec<TestStage> {
        vec![
            TestStage::new(StageId::ClaimsExtractor, &[]),
            TestStage::new(StageId::WebScraper, &[StageId::ClaimsExtractor]),
            TestStage::new(StageId::FactChecker, &[StageId::ClaimsExtractor]),
            TestStage::new(
                StageId::ReportGenerator,
                &[
                    StageId::ClaimsExtractor,
                    StageId::WebScraper,
                    StageId::FactChecker,
                ],
            ),
        ]
    }

    #[test]
    fn test_waves_follow_dependencies() {
        // registration order does not matter
        let mut stages = standard_stages();
        stages.reverse();
        let graph = TaskGraph::build(stages.into_iter().map(TestStage::boxed).collect()).unwrap();

        let waves = graph.waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec![StageId::ClaimsExtractor]);
        let mut research = waves[1].clone();
        research.sort_by_key(|s| s.output_key());
        assert_eq!(research, vec![StageId::FactChecker, StageId::WebScraper]);
        assert_eq!(waves[2], vec![StageId::ReportGenerator]);
    }

    #[test]
    fn test_build_rejects_invalid_graphs() {
        let duplicate = TaskGraph::build(vec![
            TestStage::new(StageId::ClaimsExtractor, &[]).boxed(),
            TestStage::new(StageId::ClaimsExtractor, &[]).boxed(),
        ]);
        assert!(duplicate.err().unwrap().to_string().contains("registered twice"));

        let unknown = TaskGraph::build(vec![
            TestStage::new(StageId::WebScraper, &[StageId::ClaimsExtractor]).boxed(),
        ]);
        assert!(unknown.err().unwrap().to_string().contains("unknown stage"));

        let cycle = TaskGraph::build(vec![
            TestStage::new(StageId::ClaimsExtractor, &[StageId::ReportGenerator]).boxed(),
            TestStage::new(StageId::ReportGenerator, &[StageId::ClaimsExtractor]).boxed(),
        ]);
        assert!(cycle.err().unwrap().to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn test_run_writes_every_output_and_traces_stages() {
        let graph =
            TaskGraph::build(standard_stages().into_iter().map(TestStage::boxed).collect()).unwrap();
        let trace = Trace::new();

        let results = graph.run("The Earth is flat", &trace).await.unwrap();

        assert_eq!(results.len(), 4);
        assert!(results.contains(StageId::ReportGenerator));

        let events = trace.events();
        assert_eq!(events.len(), 8);
        let report_start = events
            .iter()
            .position(|e| {
                e.stage == StageId::ReportGenerator && e.event_type == TraceEventType::StageStart
            })
            .unwrap();
        for research in [StageId::WebScraper, StageId::FactChecker] {
            let end = events
                .iter()
                .position(|e| e.stage == research && e.event_type == TraceEventType::StageEnd)
                .unwrap();
            assert!(end < report_start, "{research} must finish before the report starts");
        }
    }

    #[tokio::test]
    async fn test_research_stages_run_concurrently() {
        // each sibling waits for the other, so sequential execution would hang
        let barrier = Arc::new(Barrier::new(2));
        let mut stages = standard_stages();
        stages[1].barrier = Some(barrier.clone());
        stages[2].barrier = Some(barrier);

        let graph = TaskGraph::build(stages.into_iter().map(TestStage::boxed).collect()).unwrap();
        let trace = Trace::new();
        let run = graph.run("text", &trace);

        let results = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("research stages did not overlap")
            .unwrap();
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn test_sibling_failure_fails_run() {
        let mut stages = standard_stages();
        stages[1].fail = true;
        let graph = TaskGraph::build(stages.into_iter().map(TestStage::boxed).collect()).unwrap();
        let trace = Trace::new();

        let err = graph.run("text", &trace).await.unwrap_err();
        assert_eq!(err.kind(), "tool");

        let events = trace.events();
        assert!(events
            .iter()
            .any(|e| e.stage == StageId::WebScraper && e.event_type == TraceEventType::StageError));
        assert!(!events.iter().any(|e| e.stage == StageId::ReportGenerator));
    }

    #[tokio::test]
    async fn test_undeclared_read_fails_stage() {
        let graph = TaskGraph::build(vec![
            TestStage::new(StageId::ClaimsExtractor, &[]).boxed(),
            TestStage::new(StageId::WebScraper, &[StageId::ClaimsExtractor]).boxed(),
            TestStage::new(StageId::FactChecker, &[StageId::ClaimsExtractor]).boxed(),
            // forgets the fact checker
            TestStage::new(
                StageId::ReportGenerator,
                &[StageId::ClaimsExtractor, StageId::WebScraper],
            )
            .boxed(),
        ])
        .unwrap();

        let err = graph.run("text", &Trace::new()).await.unwrap_err();
        assert!(matches!(err, Error::Graph(_)));
    }
}
