//! Advisor council: concurrent answers, anonymous peer critique, synthesis

use futures::future::join_all;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CouncilConfig;
use crate::error::{AdvisorError, Result};
use crate::llm::consensus::{compute_consensus, parse_critique, rank_responses};
use crate::llm::router::LlmRouter;
use crate::llm::types::{
    council_models, ChatCompletionOptions, ChatMessage, Consensus, CouncilCritique,
    CouncilMetadata, CouncilResponse, CouncilResult, ModelConfig, ProviderId,
};
use crate::sanitize::{restore_pii, sanitize, sanitize_pii, strip_reasoning, PiiMapping, PiiSubjects};

/// Fewest answers critique can work with
const QUORUM: usize = 2;

const ADVISOR_PROMPT: &str = "You are a seasoned startup advisor sitting on a council of independent experts. \
Give concrete, actionable advice grounded in the founder's situation. \
Be specific about numbers, trade-offs and next steps. Write in plain prose.";

const CRITIC_PROMPT: &str = "You are reviewing an answer written by another advisor. You do not know who wrote it. \
Judge accuracy, specificity and usefulness to a startup founder. \
Respond with JSON only, in this shape: \
{\"score\": <integer 1-10>, \"feedback\": \"<one paragraph>\", \"strengths\": [\"...\"], \"weaknesses\": [\"...\"]}";

const CRITIQUE_TEMPERATURE: f32 = 0.3;

/// Extra material for a council run. Names in `subjects` are replaced with
/// placeholders before any provider sees the text and put back in the
/// final answer.
#[derive(Debug, Clone, Default)]
pub struct CouncilContext {
    pub text: Option<String>,
    pub subjects: PiiSubjects,
}

impl CouncilContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            subjects: PiiSubjects::default(),
        }
    }

    pub fn with_subjects(mut self, subjects: PiiSubjects) -> Self {
        self.subjects = subjects;
        self
    }
}

/// Council of models that deliberate on one question
pub struct Council {
    router: Arc<LlmRouter>,
    models: Vec<ModelConfig>,
    settings: CouncilConfig,
}

/// Tokens spent across every phase
#[derive(Default)]
struct Tally {
    tokens: u32,
}

impl Council {
    /// Only `council`-role models from `catalog` take part
    pub fn new(router: Arc<LlmRouter>, catalog: &[ModelConfig], settings: CouncilConfig) -> Self {
        Self {
            router,
            models: council_models(catalog),
            settings,
        }
    }

    /// Council models whose provider is registered and credentialed
    pub fn members(&self) -> Vec<&ModelConfig> {
        self.models
            .iter()
            .filter(|m| self.router.is_available(m.provider))
            .collect()
    }

    pub async fn run(&self, prompt: &str, context: Option<&CouncilContext>) -> Result<CouncilResult> {
        self.run_with_cancel(prompt, context, &CancellationToken::new())
            .await
    }

    /// Run the council, stopping early when `token` fires.
    ///
    /// Cancellation during the response phase keeps whatever answers already
    /// arrived; cancellation after it skips the remaining phases. Either way
    /// the result is built from completed answers and marked partial, unless
    /// fewer than two arrived, which yields [`AdvisorError::Cancelled`].
    pub async fn run_with_cancel(
        &self,
        prompt: &str,
        context: Option<&CouncilContext>,
        token: &CancellationToken,
    ) -> Result<CouncilResult> {
        let started = Instant::now();
        let members = self.members();
        if members.len() < QUORUM {
            return Err(AdvisorError::InsufficientModels {
                available: members.len(),
            });
        }

        let (question, mappings) = anonymize(prompt, context);
        info!("Council convened with {} models", members.len());

        let mut tally = Tally::default();
        let responses = self
            .response_phase(&members, &question, token, &mut tally)
            .await;

        if token.is_cancelled() {
            return self.partial(responses, &mappings, tally, started);
        }
        if responses.len() < QUORUM {
            return Err(AdvisorError::InsufficientResponses {
                received: responses.len(),
            });
        }

        let critiques = self
            .critique_phase(&responses, &question, token, &mut tally)
            .await;
        if token.is_cancelled() {
            return self.partial(responses, &mappings, tally, started);
        }

        let mut consensus = compute_consensus(&responses, &critiques);
        info!(
            "Consensus: best={} average={:.2}",
            consensus.best_response_id, consensus.average_score
        );

        let final_text = match self
            .synthesize(&question, &responses, &consensus, token, &mut tally)
            .await
        {
            Some(text) => {
                consensus.synthesized = true;
                text
            }
            None => best_content(&responses, &consensus),
        };

        Ok(CouncilResult {
            metadata: metadata(&responses, tally, started, false),
            final_response: restore_pii(&sanitize(&final_text), &mappings),
            responses,
            critiques,
            consensus,
        })
    }

    /// One concurrent call per member; failures are logged and dropped.
    /// Results keep fan-out order.
    async fn response_phase(
        &self,
        members: &[&ModelConfig],
        question: &str,
        token: &CancellationToken,
        tally: &mut Tally,
    ) -> Vec<CouncilResponse> {
        info!("Response phase: querying {} models", members.len());
        let messages = [ChatMessage::system(ADVISOR_PROMPT), ChatMessage::user(question)];
        let options = ChatCompletionOptions {
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            ..ChatCompletionOptions::default()
        };

        let outcomes = join_all(members.iter().map(|model| {
            self.router
                .chat_with_cancel(model.provider, Some(model.model.as_str()), &messages, &options, token)
        }))
        .await;

        let mut labels = anonymous_labels(members.len());

        let mut responses = Vec::new();
        for (model, outcome) in members.iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    let id = labels.pop().unwrap_or_default();
                    debug!("{} answered as {}", model.name, id);
                    tally.tokens += result.usage.total_tokens;
                    responses.push(CouncilResponse {
                        id,
                        content: result.content,
                        provider: model.provider,
                        model: model.model.clone(),
                        tokens: result.usage.total_tokens,
                    });
                }
                Err(AdvisorError::Cancelled) => debug!("{} cancelled", model.name),
                Err(err) => warn!("Model {} failed, excluding it: {}", model.name, err),
            }
        }

        info!("Response phase: {}/{} answered", responses.len(), members.len());
        responses
    }

    /// Every response critiques every other one, concurrently
    async fn critique_phase(
        &self,
        responses: &[CouncilResponse],
        question: &str,
        token: &CancellationToken,
        tally: &mut Tally,
    ) -> Vec<CouncilCritique> {
        let pairs: Vec<(&CouncilResponse, &CouncilResponse)> = responses
            .iter()
            .flat_map(|critic| {
                responses
                    .iter()
                    .filter(move |target| target.id != critic.id)
                    .map(move |target| (critic, target))
            })
            .collect();
        info!("Critique phase: {} reviews", pairs.len());

        let options = ChatCompletionOptions {
            temperature: Some(CRITIQUE_TEMPERATURE),
            max_tokens: self.settings.max_tokens,
            ..ChatCompletionOptions::default()
        };
        let prompts: Vec<[ChatMessage; 2]> = pairs
            .iter()
            .map(|(_, target)| {
                [
                    ChatMessage::system(CRITIC_PROMPT),
                    ChatMessage::user(self.critique_request(question, target)),
                ]
            })
            .collect();

        let outcomes = join_all(pairs.iter().zip(&prompts).map(|((critic, _), messages)| {
            self.router.chat_with_cancel(
                critic.provider,
                Some(critic.model.as_str()),
                messages,
                &options,
                token,
            )
        }))
        .await;

        let mut critiques = Vec::new();
        for ((critic, target), outcome) in pairs.iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    tally.tokens += result.usage.total_tokens;
                    let parsed = parse_critique(&result.content);
                    critiques.push(CouncilCritique {
                        response_id: target.id.clone(),
                        critic_id: critic.id.clone(),
                        score: parsed.score,
                        feedback: parsed.feedback,
                        strengths: parsed.strengths,
                        weaknesses: parsed.weaknesses,
                    });
                }
                Err(AdvisorError::Cancelled) => {}
                Err(err) => warn!("Critique of {} by {} failed: {}", target.id, critic.id, err),
            }
        }
        critiques
    }

    fn critique_request(&self, question: &str, target: &CouncilResponse) -> String {
        format!(
            "Question:\n{}\n\n{}:\n{}\n\nScore this answer from 1 to 10.",
            question,
            target.id,
            self.excerpt(&target.content)
        )
    }

    /// Merge the top-ranked answers into one. `None` when synthesis is
    /// skipped, fails, or comes back empty.
    async fn synthesize(
        &self,
        question: &str,
        responses: &[CouncilResponse],
        consensus: &Consensus,
        token: &CancellationToken,
        tally: &mut Tally,
    ) -> Option<String> {
        let top: Vec<&CouncilResponse> = rank_responses(responses, consensus)
            .into_iter()
            .take(self.settings.synthesis_top_n)
            .collect();
        if top.len() < QUORUM {
            debug!("Skipping synthesis with {} ranked responses", top.len());
            return None;
        }

        let (provider, model) = self.synthesizer(responses, consensus)?;
        let synthesis_prompt = format!(
            "You are synthesizing answers from a council of startup advisors.\n\n\
            Original question: {}\n\n\
            Ranked answers, best first:\n{}\n\n\
            Please synthesize these answers into a single, cohesive answer that:\n\
            1. Incorporates the best ideas from each answer\n\
            2. Resolves any contradictions\n\
            3. Stays concrete and actionable\n\n\
            Provide only the synthesized answer, without meta-commentary.",
            question,
            top.iter()
                .map(|r| format!("{}:\n{}\n", r.id, self.excerpt(&r.content)))
                .collect::<Vec<_>>()
                .join("\n")
        );

        let messages = [ChatMessage::system(ADVISOR_PROMPT), ChatMessage::user(synthesis_prompt)];
        let options = ChatCompletionOptions {
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            ..ChatCompletionOptions::default()
        };

        info!("Synthesizing {} answers with {}", top.len(), provider);
        match self
            .router
            .chat_with_cancel(provider, model.as_deref(), &messages, &options, token)
            .await
        {
            Ok(result) => {
                tally.tokens += result.usage.total_tokens;
                let text = strip_reasoning(&result.content).trim().to_string();
                if text.is_empty() {
                    warn!("Synthesis returned nothing, using best answer");
                    None
                } else {
                    Some(text)
                }
            }
            Err(err) => {
                warn!("Synthesis failed, using best answer: {}", err);
                None
            }
        }
    }

    /// The final-phase provider, or the best answer's own model
    fn synthesizer(
        &self,
        responses: &[CouncilResponse],
        consensus: &Consensus,
    ) -> Option<(ProviderId, Option<String>)> {
        let final_provider = self.router.phases().final_phase;
        if self.router.is_available(final_provider) {
            return Some((final_provider, None));
        }
        responses
            .iter()
            .find(|r| r.id == consensus.best_response_id)
            .map(|best| (best.provider, Some(best.model.clone())))
    }

    fn excerpt(&self, content: &str) -> String {
        truncate_response(&strip_reasoning(content), self.settings.max_response_chars).to_string()
    }

    /// Best-effort result from the answers gathered before cancellation
    fn partial(
        &self,
        responses: Vec<CouncilResponse>,
        mappings: &[PiiMapping],
        tally: Tally,
        started: Instant,
    ) -> Result<CouncilResult> {
        if responses.len() < QUORUM {
            return Err(AdvisorError::Cancelled);
        }
        warn!("Council cancelled; returning partial result from {} answers", responses.len());

        let consensus = compute_consensus(&responses, &[]);
        let final_text = best_content(&responses, &consensus);
        Ok(CouncilResult {
            metadata: metadata(&responses, tally, started, true),
            final_response: restore_pii(&sanitize(&final_text), mappings),
            responses,
            critiques: Vec::new(),
            consensus,
        })
    }
}

/// Anonymize prompt and context together so placeholders line up
fn anonymize(prompt: &str, context: Option<&CouncilContext>) -> (String, Vec<PiiMapping>) {
    let subjects = context.map(|c| c.subjects.clone()).unwrap_or_default();
    let question = sanitize_pii(prompt, &subjects);
    let mut mappings = question.mappings;

    let text = match context.and_then(|c| c.text.as_deref()) {
        Some(text) if !text.trim().is_empty() => {
            let context = sanitize_pii(text, &subjects);
            let mut merged: HashMap<String, PiiMapping> = mappings
                .drain(..)
                .map(|m| (m.placeholder.clone(), m))
                .collect();
            for mapping in context.mappings {
                merged.entry(mapping.placeholder.clone()).or_insert(mapping);
            }
            mappings = merged.into_values().collect();
            mappings.sort_by(|a, b| a.placeholder.cmp(&b.placeholder));
            format!("Context:\n{}\n\nQuestion:\n{}", context.text, question.text)
        }
        _ => question.text,
    };

    (text, mappings)
}

/// Shuffled "Response A", "Response B", ... labels
fn anonymous_labels(count: usize) -> Vec<String> {
    let mut labels: Vec<String> = (0..count)
        .map(|i| match u8::try_from(i).ok().filter(|i| *i < 26) {
            Some(i) => format!("Response {}", (b'A' + i) as char),
            None => format!("Response {}", i + 1),
        })
        .collect();
    labels.shuffle(&mut rand::thread_rng());
    labels
}

fn best_content(responses: &[CouncilResponse], consensus: &Consensus) -> String {
    responses
        .iter()
        .find(|r| r.id == consensus.best_response_id)
        .or_else(|| responses.first())
        .map(|r| r.content.clone())
        .unwrap_or_default()
}

fn metadata(responses: &[CouncilResponse], tally: Tally, started: Instant, partial: bool) -> CouncilMetadata {
    let mut models_used: Vec<String> = Vec::new();
    for response in responses {
        if !models_used.contains(&response.model) {
            models_used.push(response.model.clone());
        }
    }

    CouncilMetadata {
        total_tokens: tally.tokens,
        models_used,
        processing_time_ms: started.elapsed().as_millis() as u64,
        partial,
    }
}

/// Cut a response to at most `max_chars` characters
pub fn truncate_response(response: &str, max_chars: usize) -> &str {
    match response.char_indices().nth(max_chars) {
        Some((idx, _)) => &response[..idx],
        None => response,
    }
}
