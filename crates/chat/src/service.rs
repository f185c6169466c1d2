//! The chat service: one inbound user turn in, one assistant turn out.
//!
//! # Flow
//!
//! 1. Resolve candidate chunks (request-supplied, else loaded from the index)
//! 2. Retrieve (grounded mode only), degrading on index failure
//! 3. Assemble the prompt with the conversation's summary projection
//! 4. Report any history drop to the summary tracker
//! 5. Call the provider under a deadline
//!
//! Summarization runs separately through [`ChatService::summarize`], so a
//! slow or failing condensation never blocks a reply.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_config::AppConfig;
use parley_context::{
    AssembledPrompt, AssemblyError, ChunkRetriever, ContextPipeline, DroppedRange, PipelineInput,
    RetrievalResult, SummaryPolicy, SummaryRegistry, SummaryStatus, Transition,
};
use parley_core::provider::{ProviderMessage, ProviderRequest};
use parley_core::{
    ChatMode, Chunk, ChunkIndex, ConversationBudget, ConversationId, DomainEvent, EventBus, Provider,
    Turn, Usage, UserTurnOverflow,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::summarizer;

/// Per-service settings, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub budget: ConversationBudget,
    pub overflow: UserTurnOverflow,
    pub summary_policy: SummaryPolicy,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            budget: config.context.budget(),
            overflow: config.context.user_turn_overflow,
            summary_policy: SummaryPolicy {
                drop_threshold: config.context.summarization_drop_threshold,
                resummarize: config.context.resummarize,
            },
            model: config.inference.model.clone(),
            temperature: config.inference.temperature,
            max_tokens: config.inference.max_tokens,
            timeout: Duration::from_secs(config.inference.timeout_secs),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One inbound chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub mode: ChatMode,
    /// Stored history, oldest first.
    #[serde(default)]
    pub history: Vec<Turn>,
    pub user_text: String,
    /// Documents attached to the conversation.
    #[serde(default)]
    pub document_ids: Vec<String>,
    /// Explicit candidate chunks. When empty, chunks of `document_ids` are
    /// loaded from the index.
    #[serde(default)]
    pub candidates: Vec<Chunk>,
    /// Overrides the service budget for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<ConversationBudget>,
}

impl ChatRequest {
    pub fn new(conversation_id: ConversationId, user_text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            mode: ChatMode::Open,
            history: Vec::new(),
            user_text: user_text.into(),
            document_ids: Vec::new(),
            candidates: Vec::new(),
            budget: None,
        }
    }

    pub fn grounded(mut self, candidates: Vec<Chunk>) -> Self {
        self.mode = ChatMode::Grounded;
        self.candidates = candidates;
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// The new user turn, numbered after the last history turn.
    pub fn user_turn(&self) -> Turn {
        let next = self.history.last().map_or(1, |t| t.sequence_number + 1);
        Turn::user(next, self.user_text.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub user_turn: Turn,
    pub assistant_turn: Turn,
    pub prompt: AssembledPrompt,
    /// Authoritative usage from the provider, when reported.
    pub usage: Option<Usage>,
    pub model: String,
    pub retrieval_degraded: bool,
    pub summary_status: SummaryStatus,
    /// Range the tracker now wants condensed, if this request triggered it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarization_requested: Option<DroppedRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummarizationOutcome {
    /// Nothing to condense.
    NotPending,
    Applied { covered_through: u64, summary_tokens: usize },
    /// The attempt failed; the tracker stays PENDING.
    Failed { attempts: u32, error: String },
    /// The pending range grew while the summary was produced; result discarded.
    Superseded,
}

pub struct ChatService {
    provider: Arc<dyn Provider>,
    index: Option<Arc<dyn ChunkIndex>>,
    event_bus: Arc<EventBus>,
    summaries: RwLock<SummaryRegistry>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(provider: Arc<dyn Provider>, settings: ChatSettings) -> Self {
        Self {
            provider,
            index: None,
            event_bus: Arc::new(EventBus::default()),
            summaries: RwLock::new(SummaryRegistry::new(settings.summary_policy)),
            settings,
        }
    }

    pub fn with_index(mut self, index: Arc<dyn ChunkIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub async fn summary_state(&self, conversation_id: &ConversationId) -> SummaryStatus {
        self.summaries.read().await.status(conversation_id)
    }

    /// Retrieve chunks for `request` without assembling or calling the provider.
    pub async fn retrieve(&self, request: &ChatRequest) -> RetrievalResult {
        if !request.mode.is_grounded() {
            return RetrievalResult::empty();
        }
        let budget = request.budget.as_ref().unwrap_or(&self.settings.budget);
        let retriever = ChunkRetriever::from_budget(budget);
        let index = self.index.as_deref();

        let mut load_failed = false;
        let candidates = if !request.candidates.is_empty() || request.document_ids.is_empty() {
            request.candidates.clone()
        } else if let Some(index) = index {
            match index.chunks_for_documents(&request.document_ids).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(backend = index.name(), error = %e, "Could not load document chunks");
                    load_failed = true;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut result = retriever.retrieve(index, &request.user_text, &candidates).await;
        result.degraded |= load_failed;
        if result.degraded {
            self.event_bus.publish(DomainEvent::RetrievalDegraded {
                conversation_id: request.conversation_id.to_string(),
                reason: "full-text index unavailable".into(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    /// Assemble the prompt for `request` and update summary state, without inference.
    pub async fn prepare(
        &self,
        request: &ChatRequest,
    ) -> Result<(AssembledPrompt, RetrievalResult, Option<DroppedRange>), ChatError> {
        let conversation_id = request.conversation_id.to_string();
        let retrieval = self.retrieve(request).await;
        let user_turn = request.user_turn();
        let budget = request.budget.clone().unwrap_or_else(|| self.settings.budget.clone());
        let pipeline = ContextPipeline::new(budget).with_overflow_policy(self.settings.overflow);

        let assembled = {
            let registry = self.summaries.read().await;
            pipeline.assemble(&PipelineInput {
                mode: request.mode,
                history: &request.history,
                user_turn: &user_turn,
                retrieval: &retrieval,
                summary: registry.get(&request.conversation_id),
            })
        };

        let prompt = match assembled {
            Ok(prompt) => prompt,
            Err(AssemblyError::ContextOverflow { user_tokens, budget }) => {
                self.event_bus.publish(DomainEvent::ContextOverflow {
                    conversation_id,
                    user_tokens,
                    budget,
                    timestamp: Utc::now(),
                });
                return Err(AssemblyError::ContextOverflow { user_tokens, budget }.into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut requested = None;
        if let Some(drop) = &prompt.history_drop {
            self.event_bus.publish(DomainEvent::HistoryDropped {
                conversation_id: conversation_id.clone(),
                dropped_count: drop.dropped_count,
                first_dropped_sequence: drop.first_dropped_sequence,
                last_dropped_sequence: drop.last_dropped_sequence,
                timestamp: Utc::now(),
            });

            let transition = self
                .summaries
                .write()
                .await
                .tracker_mut(&request.conversation_id)
                .observe_drop(drop);
            if let Transition::Requested(range) | Transition::Extended(range) = transition {
                info!(
                    conversation_id = %conversation_id,
                    first = range.first_sequence,
                    last = range.last_sequence,
                    "Summarization requested"
                );
                self.event_bus.publish(DomainEvent::SummarizationRequested {
                    conversation_id: conversation_id.clone(),
                    first_sequence: range.first_sequence,
                    last_sequence: range.last_sequence,
                    timestamp: Utc::now(),
                });
                requested = Some(range);
            }
        }

        Ok((prompt, retrieval, requested))
    }

    /// Answer one user turn.
    pub async fn respond(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let (prompt, retrieval, summarization_requested) = self.prepare(&request).await?;
        let user_turn = request.user_turn();

        let provider_request = ProviderRequest {
            model: self.settings.model.clone(),
            messages: prompt
                .turns
                .iter()
                .map(|t| ProviderMessage::new(t.role, t.text.clone()))
                .collect(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        debug!(
            conversation_id = %request.conversation_id,
            provider = self.provider.name(),
            prompt_tokens = prompt.total_tokens,
            "Calling inference provider"
        );
        let response = self.complete_with_deadline(provider_request).await?;

        if let Some(usage) = response.usage {
            debug!(
                estimated = prompt.total_tokens,
                reported = usage.prompt_tokens,
                "Prompt token estimate against provider usage"
            );
        }

        self.event_bus.publish(DomainEvent::ResponseGenerated {
            conversation_id: request.conversation_id.to_string(),
            model: response.model.clone(),
            prompt_tokens_estimated: prompt.total_tokens,
            tokens_used: response.usage.map(|u| u.total_tokens),
            timestamp: Utc::now(),
        });

        let assistant_turn = Turn::assistant(user_turn.sequence_number + 1, response.content);
        let summary_status = self.summary_state(&request.conversation_id).await;

        Ok(ChatReply {
            user_turn,
            assistant_turn,
            prompt,
            usage: response.usage,
            model: response.model,
            retrieval_degraded: retrieval.degraded,
            summary_status,
            summarization_requested,
        })
    }

    /// Condense the pending range of `conversation_id`, if any.
    ///
    /// `history` is the conversation's stored history. Failures are recorded
    /// on the tracker and reported in the outcome, not as errors.
    pub async fn summarize(
        &self,
        conversation_id: &ConversationId,
        history: &[Turn],
    ) -> SummarizationOutcome {
        let (range, turns) = {
            let registry = self.summaries.read().await;
            let Some(tracker) = registry.get(conversation_id) else {
                return SummarizationOutcome::NotPending;
            };
            let Some(range) = tracker.pending_range() else {
                return SummarizationOutcome::NotPending;
            };
            (range, tracker.pending_turns(history))
        };

        let produced = if turns.is_empty() {
            Err("pending turns are not present in the supplied history".to_string())
        } else {
            let request =
                summarizer::build_request(&turns, &self.settings.model, self.settings.temperature);
            self.complete_with_deadline(request)
                .await
                .map(|r| r.content)
                .map_err(|e| e.to_string())
        };

        let mut registry = self.summaries.write().await;
        let tracker = registry.tracker_mut(conversation_id);
        if tracker.pending_range() != Some(range) {
            debug!(conversation_id = %conversation_id, "Pending range moved, discarding summary");
            return SummarizationOutcome::Superseded;
        }

        let error = match produced {
            Ok(text) => match tracker.apply_summary(&text) {
                Ok(applied) => {
                    let covered_through = applied.covered_through;
                    let summary_tokens = applied.summary.token_count();
                    info!(conversation_id = %conversation_id, covered_through, summary_tokens, "Summary applied");
                    self.event_bus.publish(DomainEvent::SummaryApplied {
                        conversation_id: conversation_id.to_string(),
                        covered_through,
                        summary_tokens,
                        timestamp: Utc::now(),
                    });
                    return SummarizationOutcome::Applied {
                        covered_through,
                        summary_tokens,
                    };
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e,
        };

        let attempts = tracker.record_failure().unwrap_or_default();
        warn!(conversation_id = %conversation_id, attempts, error = %error, "Summarization failed");
        self.event_bus.publish(DomainEvent::SummarizationFailed {
            conversation_id: conversation_id.to_string(),
            attempts,
            error_message: error.clone(),
            timestamp: Utc::now(),
        });
        SummarizationOutcome::Failed { attempts, error }
    }

    async fn complete_with_deadline(
        &self,
        request: ProviderRequest,
    ) -> Result<parley_core::ProviderResponse, ChatError> {
        match tokio::time::timeout(self.settings.timeout, self.provider.complete(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    provider = self.provider.name(),
                    timeout_secs = self.settings.timeout.as_secs(),
                    "Inference call timed out"
                );
                Err(ChatError::Timeout {
                    secs: self.settings.timeout.as_secs(),
                })
            }
        }
    }
}
