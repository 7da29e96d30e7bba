//! The turn orchestrator - single writer per conversation.
//!
//! Owns the turn state machines, routes each turn to the current
//! participant's backend through the guard stack, accounts tokens and cost,
//! and commits results to the store. Conversation history is only mutated
//! here.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::StreamExt;
use parley_core::pricing::cost_of;
use parley_core::{
    Conversation, ConversationSummary, Message, OrchestratorConfig, Participant,
};
use parley_llm::{
    BackendError, BackendRegistry, CacheStats, CachedResponse, Fingerprint, GenerationParams,
    GuardedCaller, ResponseCache,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::budget::{BudgetReport, TokenEstimator};
use crate::error::{OrchestratorError, Result};
use crate::machine::{TurnEvent, TurnMachine, TurnState};
use crate::store::ConversationStore;
use crate::stream::{StreamEvent, TurnEventStream};

pub struct TurnOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<BackendRegistry>,
    caller: Arc<GuardedCaller>,
    cache: Arc<ResponseCache>,
    store: Arc<dyn ConversationStore>,
    machines: Arc<DashMap<Uuid, Arc<Mutex<TurnMachine>>>>,
}

impl TurnOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: BackendRegistry,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let caller = Arc::new(GuardedCaller::from_options(&config.runtime));
        let cache = Arc::new(ResponseCache::new(
            config.runtime.cache_max_size,
            Duration::from_secs(config.runtime.cache_ttl_secs),
        ));
        Self {
            config,
            registry: Arc::new(registry),
            caller,
            cache,
            store,
            machines: Arc::new(DashMap::new()),
        }
    }

    /// Start a conversation: the prompt becomes message 0 and the first
    /// participant is up.
    pub async fn start_conversation(
        &self,
        initial_prompt: impl Into<String>,
        participants: Vec<Participant>,
    ) -> Result<Conversation> {
        if participants.is_empty() {
            return Err(OrchestratorError::NoParticipants);
        }

        let conversation = Conversation::new(initial_prompt, participants);

        let mut machine = TurnMachine::new();
        machine.handle_event(TurnEvent::ConversationStarted);
        self.machines
            .insert(conversation.id, Arc::new(Mutex::new(machine)));

        self.store.create(conversation.clone()).await?;
        log::info!(
            "Started conversation {} with {} participants",
            conversation.id,
            conversation.participants.len()
        );
        Ok(conversation)
    }

    /// Run one turn to completion and commit the result.
    ///
    /// `override_last` substitutes the content of the most recent message in
    /// the outgoing request only; the stored history is never rewritten.
    pub async fn advance_turn(
        &self,
        id: Uuid,
        override_last: Option<&str>,
    ) -> Result<Message> {
        let mut conversation = self.store.load(id).await?;
        if conversation.is_ended() {
            return Err(OrchestratorError::ConversationEnded(id));
        }

        let machine = self.machine_for(&conversation);
        let guard = TurnGuard::begin(&machine, id)?;

        let participant = conversation.current_participant().clone();
        let request = outgoing_messages(&conversation, override_last);
        self.check_budget(&request, &participant);

        let fingerprint = fingerprint_of(&participant, &request);
        if let Some(hit) = self.cache.get(&fingerprint) {
            let message = Message::assistant(&participant.name, &hit.text, hit.tokens, hit.cost);
            conversation.push_message(message.clone());
            conversation.advance_turn();
            self.store.update(conversation).await?;
            guard.complete();
            return Ok(message);
        }

        let backend = self.registry.get(participant.backend)?;
        let params = params_for(&participant);
        let text = match self
            .caller
            .generate(participant.backend, backend.as_ref(), &request, &params)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Turn failed for {} ({}): {}", participant.name, id, err);
                guard.fail(&err.to_string());
                return Err(err.into());
            }
        };

        let (tokens, cost) = self.account(&participant, &request, &text);
        let message = Message::assistant(&participant.name, &text, tokens, cost);
        conversation.push_message(message.clone());
        conversation.advance_turn();
        self.store.update(conversation).await?;
        self.cache.insert(fingerprint, CachedResponse { text, tokens, cost });
        guard.complete();

        log::debug!("Turn committed for {} ({} tokens)", participant.name, tokens);
        Ok(message)
    }

    /// Run one turn as an event stream: `Metadata`, then content fragments,
    /// then a terminal `Completed` or `Failed`.
    ///
    /// The conversation is committed only when `Completed` is emitted;
    /// dropping the stream mid-flight abandons the turn without a commit.
    pub async fn advance_turn_streaming(
        &self,
        id: Uuid,
        override_last: Option<&str>,
    ) -> Result<TurnEventStream> {
        let mut conversation = self.store.load(id).await?;
        if conversation.is_ended() {
            return Err(OrchestratorError::ConversationEnded(id));
        }

        let machine = self.machine_for(&conversation);
        let guard = TurnGuard::begin(&machine, id)?;

        let participant = conversation.current_participant().clone();
        let request = outgoing_messages(&conversation, override_last);
        self.check_budget(&request, &participant);

        let fingerprint = fingerprint_of(&participant, &request);
        let backend = self.registry.get(participant.backend)?;
        let params = params_for(&participant);

        let caller = self.caller.clone();
        let cache = self.cache.clone();
        let store = self.store.clone();
        let config = self.config.clone();

        let events = async_stream::stream! {
            yield StreamEvent::Metadata {
                participant: participant.name.clone(),
                model: participant.model.clone(),
                timestamp: Utc::now(),
            };

            if let Some(hit) = cache.get(&fingerprint) {
                yield StreamEvent::ContentDelta { text: hit.text.clone() };
                conversation.push_message(Message::assistant(
                    &participant.name,
                    &hit.text,
                    hit.tokens,
                    hit.cost,
                ));
                conversation.advance_turn();
                match store.update(conversation).await {
                    Ok(()) => {
                        guard.complete();
                        yield StreamEvent::Completed {
                            full_text: hit.text,
                            tokens: hit.tokens,
                            cost: hit.cost,
                        };
                    }
                    Err(err) => {
                        guard.fail(&err.to_string());
                        yield StreamEvent::Failed { error: err.to_string() };
                    }
                }
                return;
            }

            let mut fragments = match caller
                .open_stream(participant.backend, backend.as_ref(), &request, &params)
                .await
            {
                Ok(fragments) => fragments,
                Err(err) => {
                    guard.fail(&err.to_string());
                    yield StreamEvent::Failed { error: err.to_string() };
                    return;
                }
            };

            let mut full_text = String::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        full_text.push_str(&fragment);
                        yield StreamEvent::ContentDelta { text: fragment };
                    }
                    Err(err) => {
                        guard.fail(&err.to_string());
                        yield StreamEvent::Failed { error: err.to_string() };
                        return;
                    }
                }
            }

            // A stream that ended without producing any text is a failure,
            // not an empty committed turn.
            if full_text.is_empty() {
                let err = BackendError::EmptyResponse("stream produced no content".into());
                guard.fail(&err.to_string());
                yield StreamEvent::Failed { error: err.to_string() };
                return;
            }

            let input = TokenEstimator::estimate_request(&request, &participant.system_prompt);
            let output = TokenEstimator::estimate_text(&full_text);
            let tokens = input + output;
            let cost = cost_of(&config, &participant.model, input, output);

            conversation.push_message(Message::assistant(
                &participant.name,
                &full_text,
                tokens,
                cost,
            ));
            conversation.advance_turn();
            match store.update(conversation).await {
                Ok(()) => {
                    cache.insert(
                        fingerprint,
                        CachedResponse { text: full_text.clone(), tokens, cost },
                    );
                    guard.complete();
                    yield StreamEvent::Completed { full_text, tokens, cost };
                }
                Err(err) => {
                    guard.fail(&err.to_string());
                    yield StreamEvent::Failed { error: err.to_string() };
                }
            }
        };

        Ok(Box::pin(events))
    }

    /// Run up to `max_turns` consecutive turns with the configured delay
    /// between them. Cancellation between turns stops cleanly; a turn
    /// error aborts the loop and is propagated.
    pub async fn run_autonomous(
        &self,
        id: Uuid,
        max_turns: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<Message>> {
        let delay = Duration::from_millis(self.config.runtime.inter_turn_delay_ms);
        let mut produced = Vec::with_capacity(max_turns);

        for turn in 0..max_turns {
            if cancel.is_cancelled() {
                log::info!("Autonomous run for {} cancelled after {} turns", id, turn);
                break;
            }

            // Cancellation is only honored between turns; a call in
            // flight always runs to completion.
            let message = self.advance_turn(id, None).await?;
            produced.push(message);

            if turn + 1 < max_turns {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Ok(produced)
    }

    /// End a conversation. Idempotent.
    pub async fn end_conversation(&self, id: Uuid) -> Result<Conversation> {
        let mut conversation = self.store.load(id).await?;
        if !conversation.is_ended() {
            conversation.end();
            self.store.update(conversation.clone()).await?;
        }
        let machine = self.machine_for(&conversation);
        machine.lock().unwrap().handle_event(TurnEvent::EndRequested);
        log::info!("Conversation {} ended", id);
        Ok(conversation)
    }

    pub async fn conversation(&self, id: Uuid) -> Result<Conversation> {
        Ok(self.store.load(id).await?)
    }

    /// Conversation summaries, most recently updated first.
    pub async fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let summaries = self.store.list().await?;
        Ok(summaries.into_iter().skip(offset).take(limit).collect())
    }

    pub async fn delete_conversation(&self, id: Uuid) -> Result<()> {
        self.store.delete(id).await?;
        self.machines.remove(&id);
        Ok(())
    }

    /// Full conversation record as pretty-printed JSON.
    pub async fn export(&self, id: Uuid) -> Result<String> {
        let conversation = self.store.load(id).await?;
        Ok(serde_json::to_string_pretty(&conversation)?)
    }

    /// Budget report for the next turn of this conversation.
    pub async fn token_usage(&self, id: Uuid) -> Result<BudgetReport> {
        let conversation = self.store.load(id).await?;
        let participant = conversation.current_participant();
        let used = TokenEstimator::estimate_request(
            &conversation.messages,
            &participant.system_prompt,
        );
        Ok(BudgetReport::new(
            used,
            self.config.model_limit(&participant.model),
            self.config.runtime.warning_threshold,
            self.config.runtime.token_buffer,
        ))
    }

    /// Current turn state, if this orchestrator has seen the conversation.
    pub fn turn_state(&self, id: Uuid) -> Option<TurnState> {
        self.machines
            .get(&id)
            .map(|machine| machine.lock().unwrap().state().clone())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn machine_for(&self, conversation: &Conversation) -> Arc<Mutex<TurnMachine>> {
        // Conversations loaded from the store get a machine rebuilt from
        // their persisted status.
        self.machines
            .entry(conversation.id)
            .or_insert_with(|| {
                let state = if conversation.is_ended() {
                    TurnState::Ended
                } else {
                    TurnState::AwaitingTurn
                };
                Arc::new(Mutex::new(TurnMachine::with_state(state)))
            })
            .clone()
    }

    fn check_budget(&self, request: &[Message], participant: &Participant) {
        let used = TokenEstimator::estimate_request(request, &participant.system_prompt);
        let report = BudgetReport::new(
            used,
            self.config.model_limit(&participant.model),
            self.config.runtime.warning_threshold,
            self.config.runtime.token_buffer,
        );
        if report.exceeded {
            log::warn!(
                "Context window exceeded for {}: {}/{} tokens",
                participant.model,
                report.used,
                report.max_tokens
            );
        } else if report.warning {
            log::warn!(
                "Approaching context window for {}: {:.2}% used",
                participant.model,
                report.percentage
            );
        }
    }

    fn account(&self, participant: &Participant, request: &[Message], reply: &str) -> (u32, f64) {
        let input = TokenEstimator::estimate_request(request, &participant.system_prompt);
        let output = TokenEstimator::estimate_text(reply);
        let cost = cost_of(&self.config, &participant.model, input, output);
        (input + output, cost)
    }
}

fn params_for(participant: &Participant) -> GenerationParams {
    GenerationParams {
        model: participant.model.clone(),
        temperature: participant.temperature,
        system_prompt: participant.system_prompt.clone(),
    }
}

fn fingerprint_of(participant: &Participant, request: &[Message]) -> Fingerprint {
    Fingerprint::compute(
        participant.backend.as_str(),
        &participant.model,
        request,
        f64::from(participant.temperature),
    )
}

/// Outgoing request history, with the optional per-call substitution of the
/// last message's content.
fn outgoing_messages(conversation: &Conversation, override_last: Option<&str>) -> Vec<Message> {
    let mut messages = conversation.messages.clone();
    if let Some(text) = override_last {
        if let Some(last) = messages.last_mut() {
            last.content = text.to_string();
        }
    }
    messages
}

/// Marks a turn in flight and guarantees the machine never sticks in
/// `Generating`: an abandoned guard records a failure on drop.
struct TurnGuard {
    machine: Arc<Mutex<TurnMachine>>,
    armed: bool,
}

impl TurnGuard {
    fn begin(machine: &Arc<Mutex<TurnMachine>>, id: Uuid) -> Result<Self> {
        let mut locked = machine.lock().unwrap();
        match locked.state() {
            TurnState::Generating => return Err(OrchestratorError::TurnInProgress(id)),
            TurnState::Ended => return Err(OrchestratorError::ConversationEnded(id)),
            _ => {}
        }
        locked.handle_event(TurnEvent::AdvanceRequested);
        drop(locked);
        Ok(Self {
            machine: machine.clone(),
            armed: true,
        })
    }

    fn complete(mut self) {
        self.machine
            .lock()
            .unwrap()
            .handle_event(TurnEvent::GenerationSucceeded);
        self.armed = false;
    }

    fn fail(mut self, error: &str) {
        self.machine
            .lock()
            .unwrap()
            .handle_event(TurnEvent::GenerationFailed {
                error: error.to_string(),
            });
        self.armed = false;
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if self.armed {
            self.machine
                .lock()
                .unwrap()
                .handle_event(TurnEvent::GenerationFailed {
                    error: "turn abandoned before completion".to_string(),
                });
        }
    }
}
