use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{AnswerResponse, AnswerService, AskError};

/// What the rendering surface shows. Exactly one variant is active, so a new
/// answer can never sit next to a stale error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PresentationState {
    #[default]
    Idle,
    Loading,
    Failed { message: String },
    Answered { text: String },
}

impl PresentationState {
    /// The in-flight indicator.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a question.")]
    Empty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("A question is already being answered")]
    InFlight,
}

/// A question that passed validation. Holds the original, untrimmed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidQuestion(String);

impl ValidQuestion {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A request that has entered `Loading` but has not been sent yet.
pub struct PendingAsk {
    service: Arc<dyn AnswerService>,
    question: ValidQuestion,
}

impl PendingAsk {
    pub async fn run(self) -> Result<AnswerResponse, AskError> {
        self.service.ask(self.question.as_str()).await
    }

    pub fn spawn(self) -> InFlight {
        InFlight {
            handle: tokio::spawn(self.run()),
        }
    }
}

/// Handle to a spawned request.
pub struct InFlight {
    handle: JoinHandle<Result<AnswerResponse, AskError>>,
}

impl InFlight {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    // Nothing aborts a request today; a timeout would go through here.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the outcome. A panicked or aborted task still yields an outcome
    /// so the lifecycle always leaves `Loading`.
    pub async fn join(self) -> Result<AnswerResponse, AskError> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(AskError::Task(e.to_string())),
        }
    }
}

/// Owns the question field and the presentation state, and turns one
/// submission into exactly one call to the answering service.
pub struct RequestLifecycle {
    service: Arc<dyn AnswerService>,
    question: String,
    state: PresentationState,
}

impl RequestLifecycle {
    pub fn new(service: Arc<dyn AnswerService>) -> Self {
        Self {
            service,
            question: String::new(),
            state: PresentationState::Idle,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn set_question(&mut self, question: impl Into<String>) {
        self.question = question.into();
    }

    pub fn question_mut(&mut self) -> &mut String {
        &mut self.question
    }

    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    /// Validate the current question. A rejection shows the fixed prompt,
    /// except while a request is in flight: `Loading` is only left by `resolve`.
    pub fn validate(&mut self) -> Result<ValidQuestion, ValidationError> {
        ValidQuestion::parse(&self.question).inspect_err(|e| {
            if !self.state.is_loading() {
                self.state = PresentationState::Failed {
                    message: e.to_string(),
                };
            }
        })
    }

    /// Enter `Loading` and hand back the request to run.
    pub fn begin(&mut self, question: ValidQuestion) -> Result<PendingAsk, LifecycleError> {
        if self.state.is_loading() {
            return Err(LifecycleError::InFlight);
        }
        debug!(question = question.as_str(), "Submitting question");
        self.state = PresentationState::Loading;
        Ok(PendingAsk {
            service: Arc::clone(&self.service),
            question,
        })
    }

    /// Leave `Loading` with the outcome of the request. Outcomes arriving with
    /// nothing in flight are dropped.
    pub fn resolve(&mut self, outcome: Result<AnswerResponse, AskError>) -> &PresentationState {
        settle(&mut self.state, outcome);
        &self.state
    }

    /// Ask and wait. The request runs as its own task, so a panicking service
    /// still resolves; dropping this future before it completes leaves the
    /// state `Failed` with [`CANCELLED_MESSAGE`].
    pub async fn submit(
        &mut self,
        question: ValidQuestion,
    ) -> Result<PresentationState, LifecycleError> {
        let task = self.begin(question)?.spawn();
        let guard = LoadingGuard {
            state: &mut self.state,
        };
        let outcome = task.join().await;
        Ok(guard.finish(outcome))
    }

    /// The single submit trigger: guard, validate, then begin.
    pub fn start_submission(&mut self) -> Option<PendingAsk> {
        if self.state.is_loading() {
            warn!("{}", LifecycleError::InFlight);
            return None;
        }
        let question = self.validate().ok()?;
        self.begin(question).ok()
    }
}

fn settle(state: &mut PresentationState, outcome: Result<AnswerResponse, AskError>) {
    if !state.is_loading() {
        warn!("Dropping request outcome with no request in flight");
        return;
    }

    *state = match outcome {
        Ok(response) => {
            info!(answer_len = response.answer.len(), "Question answered");
            PresentationState::Answered {
                text: response.answer,
            }
        }
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Question failed");
            PresentationState::Failed {
                message: e.to_string(),
            }
        }
    };
}

/// Shown when a `submit` is dropped while its request is still out.
pub const CANCELLED_MESSAGE: &str = "Request cancelled";

/// Keeps `Loading` from outliving an abandoned `submit`.
struct LoadingGuard<'a> {
    state: &'a mut PresentationState,
}

impl LoadingGuard<'_> {
    fn finish(mut self, outcome: Result<AnswerResponse, AskError>) -> PresentationState {
        settle(&mut *self.state, outcome);
        self.state.clone()
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.state.is_loading() {
            settle(&mut *self.state, Err(AskError::Task(CANCELLED_MESSAGE.to_string())));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Answers from a script and records every question it receives.
    #[derive(Default)]
    pub(crate) struct ScriptedService {
        outcomes: Mutex<VecDeque<Result<AnswerResponse, AskError>>>,
        questions: Mutex<Vec<String>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedService {
        pub(crate) fn new(outcomes: Vec<Result<AnswerResponse, AskError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Self::default()
            }
        }

        pub(crate) fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn questions(&self) -> Vec<String> {
            self.questions.lock().unwrap().clone()
        }

        pub(crate) fn remaining(&self) -> usize {
            self.outcomes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AnswerService for ScriptedService {
        async fn ask(&self, question: &str) -> Result<AnswerResponse, AskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.questions.lock().unwrap().push(question.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AskError::Transport("script exhausted".into())))
        }
    }

    pub(crate) fn answer(text: &str) -> Result<AnswerResponse, AskError> {
        Ok(AnswerResponse {
            answer: text.to_string(),
        })
    }

    fn lifecycle(service: &Arc<ScriptedService>) -> RequestLifecycle {
        RequestLifecycle::new(service.clone())
    }

    #[test]
    fn blank_questions_are_rejected() {
        for raw in ["", " ", "\t", "\n  \r\n", "\u{3000}"] {
            assert_eq!(ValidQuestion::parse(raw), Err(ValidationError::Empty), "{raw:?}");
        }
    }

    #[test]
    fn valid_question_keeps_surrounding_whitespace() {
        let question = ValidQuestion::parse("  what is GDPR? \n").unwrap();
        assert_eq!(question.as_str(), "  what is GDPR? \n");
    }

    #[tokio::test]
    async fn failed_validation_shows_prompt_without_calling_service() {
        let service = Arc::new(ScriptedService::new(vec![answer("unused")]));
        let mut lifecycle = lifecycle(&service);
        lifecycle.set_question("   ");

        assert!(lifecycle.start_submission().is_none());
        assert_eq!(
            lifecycle.state(),
            &PresentationState::Failed {
                message: "Please enter a question.".into()
            }
        );
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn success_response_becomes_answer() {
        let service = Arc::new(ScriptedService::new(vec![answer("42")]));
        let mut lifecycle = lifecycle(&service);

        let question = ValidQuestion::parse("meaning of life").unwrap();
        let state = lifecycle.submit(question).await.unwrap();

        assert_eq!(state, PresentationState::Answered { text: "42".into() });
        assert_eq!(service.calls(), 1);
        assert_eq!(service.questions(), vec!["meaning of life".to_string()]);
    }

    #[tokio::test]
    async fn errors_become_failed_with_their_message() {
        let service = Arc::new(ScriptedService::new(vec![
            Err(AskError::Application("bad question".into())),
            Err(AskError::Application("Server error".into())),
            Err(AskError::Transport("connection refused".into())),
        ]));
        let mut lifecycle = lifecycle(&service);

        for expected in ["bad question", "Server error", "connection refused"] {
            let question = ValidQuestion::parse("q").unwrap();
            let state = lifecycle.submit(question).await.unwrap();
            assert_eq!(
                state,
                PresentationState::Failed {
                    message: expected.into()
                }
            );
        }
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test]
    async fn in_flight_indicator_spans_exactly_the_request() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(ScriptedService::new(vec![answer("done")]).gated(gate.clone()));
        let mut lifecycle = lifecycle(&service);
        lifecycle.set_question("slow one");

        let task = lifecycle.start_submission().unwrap().spawn();
        assert!(lifecycle.state().is_loading());

        gate.notify_one();
        let outcome = task.join().await;
        assert!(lifecycle.state().is_loading());

        let state = lifecycle.resolve(outcome);
        assert!(!state.is_loading());
        assert_eq!(state, &PresentationState::Answered { text: "done".into() });
    }

    #[tokio::test]
    async fn resubmitting_while_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(ScriptedService::new(vec![answer("first")]).gated(gate.clone()));
        let mut lifecycle = lifecycle(&service);
        lifecycle.set_question("first");

        let task = lifecycle.start_submission().unwrap().spawn();
        tokio::task::yield_now().await;

        let again = ValidQuestion::parse("second").unwrap();
        assert_eq!(lifecycle.begin(again).err(), Some(LifecycleError::InFlight));
        assert!(lifecycle.start_submission().is_none());

        // A blank question while loading must not kick the state out of Loading.
        lifecycle.set_question("");
        assert!(lifecycle.start_submission().is_none());
        assert!(lifecycle.state().is_loading());

        gate.notify_one();
        lifecycle.resolve(task.join().await);
        assert_eq!(lifecycle.state(), &PresentationState::Answered { text: "first".into() });
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn sequential_submissions_do_not_leak() {
        let service = Arc::new(ScriptedService::new(vec![
            Err(AskError::Application("overloaded".into())),
            answer("fine now"),
        ]));
        let mut lifecycle = lifecycle(&service);
        lifecycle.set_question("same question");

        let first = lifecycle.start_submission().unwrap();
        assert!(lifecycle.state().is_loading());
        let outcome = first.run().await;
        assert_eq!(
            lifecycle.resolve(outcome),
            &PresentationState::Failed {
                message: "overloaded".into()
            }
        );

        let second = lifecycle.start_submission().unwrap();
        assert_eq!(lifecycle.state(), &PresentationState::Loading);
        let outcome = second.run().await;
        assert_eq!(
            lifecycle.resolve(outcome),
            &PresentationState::Answered {
                text: "fine now".into()
            }
        );
        assert_eq!(service.questions(), vec!["same question"; 2]);
    }

    #[tokio::test]
    async fn stale_outcome_is_dropped() {
        let service = Arc::new(ScriptedService::new(vec![]));
        let mut lifecycle = lifecycle(&service);

        let state = lifecycle.resolve(answer("late")).clone();
        assert_eq!(state, PresentationState::Idle);
    }

    struct Panicking;

    #[async_trait]
    impl AnswerService for Panicking {
        async fn ask(&self, _question: &str) -> Result<AnswerResponse, AskError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn panicking_service_still_clears_loading() {
        let mut lifecycle = RequestLifecycle::new(Arc::new(Panicking));
        lifecycle.set_question("anything");

        let task = lifecycle.start_submission().unwrap().spawn();
        let state = lifecycle.resolve(task.join().await);

        assert!(matches!(state, PresentationState::Failed { message } if !message.is_empty()));
    }

    #[tokio::test]
    async fn question_edits_do_not_reach_the_in_flight_request() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(ScriptedService::new(vec![answer("ok")]).gated(gate.clone()));
        let mut lifecycle = lifecycle(&service);
        lifecycle.set_question("original");

        let task = lifecycle.start_submission().unwrap().spawn();
        lifecycle.question_mut().push_str(" edited");
        gate.notify_one();
        lifecycle.resolve(task.join().await);

        assert_eq!(service.questions(), vec!["original"]);
        assert_eq!(lifecycle.question(), "original edited");
    }

    #[tokio::test]
    async fn panicking_service_through_submit_clears_loading() {
        let mut lifecycle = RequestLifecycle::new(Arc::new(Panicking));

        let state = lifecycle
            .submit(ValidQuestion::parse("anything").unwrap())
            .await
            .unwrap();
        assert!(matches!(state, PresentationState::Failed { ref message } if !message.is_empty()));

        let again = lifecycle.begin(ValidQuestion::parse("again").unwrap());
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn timed_out_submit_leaves_loading() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(
            ScriptedService::new(vec![answer("too late"), answer("retried")]).gated(gate.clone()),
        );
        let mut lifecycle = lifecycle(&service);

        let question = ValidQuestion::parse("slow").unwrap();
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), lifecycle.submit(question)).await;
        assert!(timed_out.is_err());
        assert_eq!(
            lifecycle.state(),
            &PresentationState::Failed {
                message: CANCELLED_MESSAGE.into()
            }
        );

        // Let the abandoned request finish; its outcome has nowhere to go.
        gate.notify_waiters();
        while service.remaining() > 1 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            lifecycle.state(),
            &PresentationState::Failed {
                message: CANCELLED_MESSAGE.into()
            }
        );

        gate.notify_one();
        let state = lifecycle
            .submit(ValidQuestion::parse("retry").unwrap())
            .await
            .unwrap();
        assert_eq!(state, PresentationState::Answered { text: "retried".into() });
        assert_eq!(service.questions(), vec!["slow", "retry"]);
    }
}
