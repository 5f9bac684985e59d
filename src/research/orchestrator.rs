//! C8 — the service orchestrator: owns one graph run end to end, maps node
//! output onto the SSE event table (§6.3), and assembles the final
//! `DeepSearchResponse`. Grounded on
//! `original_source/app/services/deepsearch_engine.py`'s top-level
//! `run_deep_search`/`stream_deep_search` entry points.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::ResearchConfig;
use super::errors::{GraphError, ResearchError};
use super::graph::{self, GraphConfig, NodeName, StateDelta};
use super::llm::LlmInvoker;
use super::nodes::NodeDeps;
use super::search_client::SearchClient;
use super::session_registry::SessionRegistry;
use super::sse::{self, EventSequencer};
use super::sse_monitor::SseMonitor;
use super::types::{
    DeepSearchMetadata, DeepSearchRequest, DeepSearchResponse, DeepSource, OverallState, SseEvent,
    SseEventKind, WebResultSource,
};

/// Process-wide handles the orchestrator needs across every request —
/// constructed once at startup and shared via `Arc` the same way
/// `AppState` wires its own services together.
pub struct ResearchService {
    pub config: Arc<ResearchConfig>,
    pub registry: Arc<SessionRegistry>,
    pub monitor: Arc<SseMonitor>,
    pub deps: Arc<NodeDeps>,
}

impl ResearchService {
    pub fn new(config: ResearchConfig, http_client: reqwest::Client) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new());
        let llm = LlmInvoker::new(http_client.clone(), Arc::clone(&config), Arc::clone(&registry));
        let search = SearchClient::new(http_client.clone(), &config);
        let deps = Arc::new(NodeDeps {
            llm,
            search,
            http_client,
            config: Arc::clone(&config),
            registry: Arc::clone(&registry),
        });
        let monitor = SseMonitor::new(config.sse_session_timeout_secs);
        Self { config, registry, monitor, deps }
    }

    fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn graph_config(&self, session_id: String, request: &DeepSearchRequest) -> GraphConfig {
        GraphConfig {
            session_id,
            max_loops: request.max_research_loops.unwrap_or(self.config.max_research_loops),
            initial_query_count: request.initial_search_query_count.unwrap_or(self.config.initial_search_query_count),
            model_override: request.reasoning_model.clone(),
            report_format: request.report_format.unwrap_or_default(),
            deps: Arc::clone(&self.deps),
        }
    }

    fn build_response(state: &OverallState, _session_id: &str, reasoning_model: &str) -> DeepSearchResponse {
        DeepSearchResponse {
            success: true,
            answer: state.answer.clone().unwrap_or_default(),
            markdown_report: state.markdown_report.clone().unwrap_or_default(),
            sources: state.final_cited_sources.iter().cloned().map(DeepSource::from).collect(),
            all_sources: state.all_sources_gathered.iter().cloned().map(DeepSource::from).collect(),
            metadata: DeepSearchMetadata {
                research_loop_count: state.research_loop_count,
                number_of_queries: state.search_query.len(),
                number_of_sources: state.final_cited_sources.len(),
                total_sources_found: state.all_sources_gathered.len(),
                reasoning_model: reasoning_model.to_string(),
                system_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            message: None,
        }
    }

    /// Non-streaming entry point: runs the graph to completion and returns
    /// the assembled response (SPEC_FULL.md §4.8's "run").
    pub async fn run(&self, request: DeepSearchRequest) -> Result<DeepSearchResponse, ResearchError> {
        request.validate().map_err(ResearchError::InvalidRequest)?;
        let session_id = Self::new_session_id();
        self.registry.create(&session_id);

        let reasoning_model = request.reasoning_model.clone().unwrap_or_else(|| self.config.primary_llm_model.clone());
        let initial_state = OverallState::new(&request.query);
        let config = self.graph_config(session_id.clone(), &request);

        let result = graph::ainvoke(initial_state, config).await;
        self.registry.cleanup(&session_id);

        match result {
            Ok(state) => Ok(Self::build_response(&state, &session_id, &reasoning_model)),
            Err(GraphError::Cancelled) => Err(ResearchError::InvalidRequest("request was cancelled".to_string())),
            Err(e) => {
                error!(session_id = %session_id, error = %e, "graph run failed");
                Err(ResearchError::Other(anyhow::anyhow!(e)))
            }
        }
    }

    /// Cancels an in-flight session; idempotent, matching the registry's
    /// one-way cancellation semantics.
    pub fn cancel(&self, session_id: &str) {
        self.registry.set_cancelled(session_id);
    }

    /// Streaming entry point. Spawns the graph driver, relays every delta
    /// as zero or more SSE events, and interleaves a 30s heartbeat and a
    /// 10s connection-liveness check (SPEC_FULL.md §4.9/§4.12) —
    /// structurally the same `tokio::select!` shape the teacher's
    /// long-running services use for cooperative timers.
    pub async fn run_stream(self: Arc<Self>, request: DeepSearchRequest, client_ip: Option<String>) -> (String, mpsc::Receiver<SseEvent>) {
        let session_id = Self::new_session_id();
        self.registry.create(&session_id);

        let (out_tx, out_rx) = mpsc::channel::<SseEvent>(128);
        let connection = self.monitor.register(&session_id, &request.query, client_ip, out_tx.clone()).await;
        let connection_id = connection.connection_id.clone();

        let service = Arc::clone(&self);
        tokio::spawn(async move {
            service.drive_stream(session_id, request, out_tx, connection_id).await;
        });

        (connection.connection_id.clone(), out_rx)
    }

    async fn drive_stream(self: Arc<Self>, session_id: String, request: DeepSearchRequest, out_tx: mpsc::Sender<SseEvent>, connection_id: String) {
        let sequencer = EventSequencer::new();
        let reasoning_model = request.reasoning_model.clone().unwrap_or_else(|| self.config.primary_llm_model.clone());
        let initial_state = OverallState::new(&request.query);
        let config = self.graph_config(session_id.clone(), &request);
        let max_loops = config.max_loops;

        let heartbeat_interval = Duration::from_secs(self.config.sse_heartbeat_secs);
        let check_interval = Duration::from_secs(self.config.sse_connection_check_secs);

        let emit = |kind: SseEventKind, message: &str| sse::build_event(&sequencer, kind, message);

        if self.send(&out_tx, &connection_id, emit(SseEventKind::Started { query: request.query.clone() }, "research started")).await.is_err() {
            self.registry.cleanup(&session_id);
            return;
        }

        let mut state = initial_state.clone();
        let mut rx = graph::astream(initial_state, config);

        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        let mut liveness = tokio::time::interval(check_interval);
        let mut web_searching_sent = false;

        let outcome = loop {
            tokio::select! {
                biased;
                item = rx.recv() => {
                    match item {
                        Some(Ok((node, delta))) => {
                            graph::apply_delta(&mut state, delta.clone());
                            if let Err(err) = self.emit_node_events(&out_tx, &connection_id, &sequencer, node, &delta, &state, &mut web_searching_sent).await {
                                break Err(err);
                            }
                        }
                        Some(Err(e)) => break Err(e),
                        None => break Ok(()),
                    }
                }
                _ = heartbeat.tick() => {
                    if self.send(&out_tx, &connection_id, emit(SseEventKind::Progress {
                        current_step: state.research_loop_count,
                        total_steps: max_loops,
                        completed_steps: state.research_loop_count,
                        percentage: progress_pct(state.research_loop_count, max_loops),
                    }, "heartbeat")).await.is_err() {
                        self.registry.set_cancelled(&session_id);
                    }
                }
                _ = liveness.tick() => {
                    if out_tx.is_closed() {
                        warn!(session_id = %session_id, "client disconnected mid-stream, cancelling");
                        self.registry.set_cancelled(&session_id);
                    }
                }
            }
        };

        match outcome {
            Ok(()) => {
                let response = Self::build_response(&state, &session_id, &reasoning_model);
                self.send(&out_tx, &connection_id, emit(
                    SseEventKind::ReportGenerated {
                        report_length: response.markdown_report.len(),
                        answer_length: response.answer.len(),
                        sources_count: response.sources.len(),
                    },
                    "report generated",
                ))
                .await
                .ok();
                self.send(&out_tx, &connection_id, emit(SseEventKind::Completed(Box::new(response)), "completed")).await.ok();
                self.monitor.complete(&connection_id).await;
            }
            Err(GraphError::Cancelled) => {
                self.send(&out_tx, &connection_id, emit(SseEventKind::Cancelled { message: "research was cancelled".to_string() }, "cancelled")).await.ok();
                self.monitor.error(&connection_id, "cancelled").await;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "streamed graph run failed");
                self.send(&out_tx, &connection_id, emit(SseEventKind::Error { error: e.to_string() }, "error")).await.ok();
                self.monitor.error(&connection_id, &e.to_string()).await;
            }
        }

        self.registry.cleanup(&session_id);
    }

    async fn send(&self, tx: &mpsc::Sender<SseEvent>, connection_id: &str, event: SseEvent) -> Result<(), ()> {
        if tx.send(event).await.is_err() {
            return Err(());
        }
        self.monitor.record_event_sent(connection_id).await;
        Ok(())
    }

    /// Translates one node's delta into the zero-or-more SSE events it
    /// implies (SPEC_FULL.md §6.3's event table).
    async fn emit_node_events(
        &self,
        tx: &mpsc::Sender<SseEvent>,
        connection_id: &str,
        sequencer: &EventSequencer,
        node: NodeName,
        delta: &StateDelta,
        state: &OverallState,
        web_searching_sent: &mut bool,
    ) -> Result<(), GraphError> {
        let cancelled_err = || GraphError::Cancelled;
        match node {
            NodeName::GenerateResearchPlan => {
                if let Some(plan) = &delta.research_plan {
                    let event = sse::build_event(
                        sequencer,
                        SseEventKind::ResearchPlan {
                            research_topic: plan.research_topic.clone(),
                            sub_topics: plan.sub_topics.clone(),
                            research_questions: plan.research_questions.clone(),
                            rationale: plan.rationale.clone(),
                        },
                        "research plan ready",
                    );
                    self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                }
                self.send(tx, connection_id, milestone_event(sequencer, 1, "research plan ready")).await.map_err(|_| cancelled_err())?;
            }
            NodeName::GenerateQuery => {
                if let Some(queries) = &delta.new_search_query {
                    let event = sse::build_event(
                        sequencer,
                        SseEventKind::QueryGenerated { queries: queries.clone(), count: queries.len(), rationale: None },
                        "search queries generated",
                    );
                    self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                }
                self.send(tx, connection_id, milestone_event(sequencer, 2, "search queries generated")).await.map_err(|_| cancelled_err())?;
            }
            NodeName::WebResearch => {
                // `web_searching` fires once per session, on the first
                // `web_research` completion, not once per dispatched query
                // (mirrors `app/services/deepsearch_service.py`'s
                // `web_searching_sent` guard).
                if !*web_searching_sent {
                    let event = sse::build_event(sequencer, SseEventKind::WebSearching { message: "searching the web".to_string() }, "searching the web");
                    self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                    *web_searching_sent = true;
                }
                self.send(tx, connection_id, milestone_event(sequencer, 3, "searching the web")).await.map_err(|_| cancelled_err())?;
                if let Some(result) = delta.web_research_results.first() {
                    let sources: Vec<WebResultSource> =
                        result.scraped_pages.iter().map(|p| WebResultSource { title: p.title.clone(), url: p.url.clone() }).collect();
                    let event = sse::build_event(sequencer, SseEventKind::WebResult { count: sources.len(), sources }, "web search results");
                    self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                }
            }
            NodeName::Reflection => {
                let event = sse::build_event(
                    sequencer,
                    SseEventKind::Reflection {
                        loop_count: state.research_loop_count,
                        is_sufficient: state.unanswered_questions.is_empty(),
                        knowledge_gap: state.knowledge_gap.clone(),
                        unanswered_questions: state.unanswered_questions.clone(),
                    },
                    "reflection complete",
                );
                self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                self.send(tx, connection_id, milestone_event(sequencer, 4, "reflection complete")).await.map_err(|_| cancelled_err())?;
            }
            NodeName::AssessContentQuality => {
                if let Some(q) = &delta.content_quality {
                    let event = sse::build_event(sequencer, SseEventKind::QualityAssessment(q.clone()), "content quality assessed");
                    self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                }
                self.send(tx, connection_id, milestone_event(sequencer, 5, "content quality assessed")).await.map_err(|_| cancelled_err())?;
            }
            NodeName::VerifyFacts => {
                if let Some(f) = &delta.fact_verification {
                    let event = sse::build_event(sequencer, SseEventKind::FactVerification(f.clone()), "facts verified");
                    self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                }
                self.send(tx, connection_id, milestone_event(sequencer, 6, "facts verified")).await.map_err(|_| cancelled_err())?;
            }
            NodeName::AssessRelevance => {
                if let Some(r) = &delta.relevance_assessment {
                    let event = sse::build_event(sequencer, SseEventKind::RelevanceAssessment(r.clone()), "relevance assessed");
                    self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                }
                self.send(tx, connection_id, milestone_event(sequencer, 7, "relevance assessed")).await.map_err(|_| cancelled_err())?;
            }
            NodeName::OptimizeSummary => {
                if let Some(o) = &delta.summary_optimization {
                    let event = sse::build_event(
                        sequencer,
                        SseEventKind::Optimization {
                            key_insights: o.key_insights.clone(),
                            actionable_items: o.actionable_items.clone(),
                            confidence_level: o.confidence_level,
                        },
                        "summary optimized",
                    );
                    self.send(tx, connection_id, event).await.map_err(|_| cancelled_err())?;
                }
            }
            NodeName::GenerateVerificationReport => {
                // No dedicated event: folded into the verification report
                // text surfaced at `finalize_answer`.
            }
            NodeName::FinalizeAnswer => {
                self.send(tx, connection_id, milestone_event(sequencer, 8, "final report generated")).await.map_err(|_| cancelled_err())?;
            }
        }
        info!(node = node.as_str(), "graph node completed");
        Ok(())
    }
}

/// One of the eight fixed-denominator milestone events (§6.3): `step` of 8,
/// percentage `step / 8 * 100`. Distinct from the heartbeat's `Progress`
/// event, which tracks loop count against the resolved `max_loops` instead.
fn milestone_event(sequencer: &EventSequencer, step: u32, message: &str) -> SseEvent {
    sse::build_event(
        sequencer,
        SseEventKind::Progress {
            current_step: step,
            total_steps: 8,
            completed_steps: step,
            percentage: step as f64 / 8.0 * 100.0,
        },
        message,
    )
}

fn progress_pct(current: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        (current as f64 / max as f64 * 100.0).min(100.0)
    }
}
