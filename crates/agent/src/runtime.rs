use anyhow::Result;
use lapwise_core::comparison::CandidateRef;
use lapwise_core::elicitation::{AnswerSignal, ElicitationStep, FieldPrompt};
use lapwise_core::errors::ApplicationError;
use lapwise_core::preferences::PreferenceUpdate;
use lapwise_core::recommendation::SearchGrounding;
use lapwise_core::session::{Session, SessionError};
use lapwise_core::RecommendationSet;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::{AnswerInterpreter, ConversationStage, UserIntent};
use crate::render::{RenderError, ResponseRenderer};

#[derive(Debug, Error)]
enum TurnError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl From<SessionError> for TurnError {
    fn from(error: SessionError) -> Self {
        Self::Application(error.into())
    }
}

/// Routes one user message per turn between the interpreter, the session and the renderer.
pub struct AgentRuntime<G, I> {
    session: Session<G>,
    interpreter: I,
    renderer: ResponseRenderer,
    pending: Option<FieldPrompt>,
    turn: u64,
}

impl<G, I> AgentRuntime<G, I>
where
    G: SearchGrounding,
    I: AnswerInterpreter,
{
    pub fn new(session: Session<G>, interpreter: I) -> Result<Self> {
        let renderer = ResponseRenderer::new(session.engine().scorer().clone())?;
        Ok(Self { session, interpreter, renderer, pending: None, turn: 0 })
    }

    pub fn session(&self) -> &Session<G> {
        &self.session
    }

    /// Opens the conversation with the first question.
    pub fn greet(&mut self) -> Result<String> {
        let step = self.session.start()?;
        self.pending = step.prompt().cloned();
        let reply = match &self.pending {
            Some(prompt) => self.renderer.greeting(prompt)?,
            None => self.renderer.summary(&step.record)?,
        };
        Ok(reply)
    }

    pub async fn handle_message(&mut self, text: &str) -> Result<String> {
        self.turn += 1;
        let correlation_id = self.correlation_id();
        self.session.set_correlation_id(correlation_id.clone());

        let stage = self.stage();
        info!(
            event_name = "agent.turn.received",
            session_id = %self.session.id(),
            correlation_id = %correlation_id,
            stage = ?stage,
            message_chars = text.chars().count(),
            "handling user message"
        );

        let intent = self.interpreter.interpret(text, stage).await;
        match self.route(intent, stage).await {
            Ok(reply) => Ok(reply),
            Err(TurnError::Application(error)) => Ok(self.render_failure(error, &correlation_id)?),
            Err(TurnError::Render(error)) => Err(error.into()),
        }
    }

    fn stage(&self) -> ConversationStage {
        if self.session.record().missing_fields().is_empty() {
            ConversationStage::Recommended
        } else {
            ConversationStage::Eliciting { pending: self.pending.as_ref().map(|prompt| prompt.field) }
        }
    }

    async fn route(&mut self, intent: UserIntent, stage: ConversationStage) -> Result<String, TurnError> {
        match (stage, intent) {
            (ConversationStage::Eliciting { .. }, UserIntent::Answer(signal)) => self.answer(signal).await,
            (ConversationStage::Recommended, UserIntent::Compare(first, second)) => {
                self.compare(&first, &second)
            }
            (ConversationStage::Recommended, UserIntent::Modify(patch)) => self.modify(&patch).await,
            _ => Ok(self.renderer.help(self.session.latest(), self.pending.as_ref())?),
        }
    }

    async fn answer(&mut self, signal: AnswerSignal) -> Result<String, TurnError> {
        let step = self.session.answer(signal)?;
        self.pending = step.prompt().cloned();
        if let Some(prompt) = &self.pending {
            return Ok(self.renderer.question(prompt)?);
        }
        self.hand_off(&step).await
    }

    async fn hand_off(&mut self, step: &ElicitationStep) -> Result<String, TurnError> {
        let summary = self.renderer.summary(&step.record)?;
        info!(
            event_name = "agent.elicitation.completed",
            session_id = %self.session.id(),
            search_text = %step.search_text,
            "preferences complete; requesting recommendations"
        );

        let outcome = match self.session.recommend().await.cloned() {
            Ok(set) => self.renderer.recommendations(&set)?,
            Err(error) => self.render_failure(error.into(), &self.correlation_id())?,
        };
        Ok(format!("{summary}\n\n{outcome}"))
    }

    fn compare(&self, first: &CandidateRef, second: &CandidateRef) -> Result<String, TurnError> {
        let Some(latest) = self.session.latest() else {
            return Ok(self.renderer.help(None, self.pending.as_ref())?);
        };

        let resolved = [first, second].map(|reference| (reference, reference.resolve(latest)));
        for (reference, candidate) in &resolved {
            if candidate.is_none() {
                return Ok(self.renderer.unknown_candidate(reference, latest));
            }
        }
        if let [(_, Some(left)), (_, Some(right))] = resolved {
            if left.id() == right.id() {
                return Ok(format!(
                    "Both of those point to {}. Pick two different laptops from the list.",
                    left.title()
                ));
            }
        }

        let result = self.session.compare(first, second)?;
        Ok(self.renderer.comparison(&result)?)
    }

    async fn modify(&mut self, patch: &PreferenceUpdate) -> Result<String, TurnError> {
        let refreshed = if self.session.latest().is_some() {
            self.session.refine(patch).await.cloned()
        } else {
            self.session.relax(patch).await.cloned()
        };
        let set: RecommendationSet = refreshed?;
        let changed =
            patch.concrete_only().fields().map(|field| field.label()).collect::<Vec<_>>().join(", ");
        Ok(format!("Updated {changed}.\n\n{}", self.renderer.recommendations(&set)?))
    }

    fn render_failure(&self, error: ApplicationError, correlation_id: &str) -> Result<String, RenderError> {
        warn!(
            event_name = "agent.turn.failed",
            session_id = %self.session.id(),
            correlation_id = %correlation_id,
            error = %error,
            "turn failed"
        );
        let interface = error.into_interface(correlation_id);
        self.renderer.error(&interface)
    }

    fn correlation_id(&self) -> String {
        format!("{}:{}", self.session.id(), self.turn)
    }
}
