//! The session event loop.
//!
//! ```text
//!                           ┌─ interrupt channel ─ BoxEvent (lid reed)
//! SessionRunner::run ◀──────┤
//!                           └─ event channel ───── SessionEvent
//!                                  ▲
//!          spawned pipeline tasks ─┘  (transcribe, generate + classify)
//! ```
//!
//! A single task owns the [`Session`]; everything else communicates through
//! channels.  The `select!` is biased so lid interrupts preempt queued
//! events, and exactly one response deadline is outstanding at any time:
//! arming a new one replaces the old, and firing or resetting clears it.
//!
//! Slow pipeline stages (speech-to-text, generation, classification) run in
//! spawned tasks stamped with the session generation.  After a reset the
//! generation advances and late results from the previous life of the
//! session are discarded on arrival.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::classify::{Outcome, OutcomeClassifier};
use crate::config::AppConfig;
use crate::hardware::BoxEvent;
use crate::llm::{ChatMessage, ResponseGenerator};
use crate::speech::{Speaker, Transcriber};
use crate::status::{AssistantStatus, StatusSink};
use crate::wake::{GateAction, WakeWordGate};

use super::events::{ExchangeStage, SessionEvent};
use super::intent::{detect_affirmation, detect_all_set, Affirmation};
use super::prompts;
use super::state::{ConversationState, Session, Speaker as TurnSpeaker, TimeoutKind, Turn};

// ---------------------------------------------------------------------------
// SessionRunner
// ---------------------------------------------------------------------------

/// Owns the conversation session and reacts to events until shutdown.
pub struct SessionRunner {
    config: AppConfig,
    session: Session,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn ResponseGenerator>,
    classifier: Arc<OutcomeClassifier>,
    speaker: Arc<dyn Speaker>,
    status: Arc<dyn StatusSink>,
    /// Sender cloned into spawned pipeline tasks.
    events_tx: mpsc::Sender<SessionEvent>,
    /// The single outstanding response deadline.
    deadline: Option<Instant>,
    /// Bumped whenever an in-progress capture must be abandoned; the audio
    /// bridge cancels its endpoint detector when it observes a change.
    capture_epoch: Arc<AtomicU64>,
    /// Set after a procedure-done response: the next user turn is an
    /// all-set confirmation rather than a normal exchange.
    confirming_done: bool,
}

impl SessionRunner {
    pub fn new(
        config: AppConfig,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn ResponseGenerator>,
        classifier: Arc<OutcomeClassifier>,
        speaker: Arc<dyn Speaker>,
        status: Arc<dyn StatusSink>,
        events_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            session: Session::new(),
            transcriber,
            generator,
            classifier,
            speaker,
            status,
            events_tx,
            deadline: None,
            capture_epoch: Arc::new(AtomicU64::new(0)),
            confirming_done: false,
        }
    }

    /// Shared epoch the audio bridge watches to abandon mid-flight captures.
    pub fn capture_epoch(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.capture_epoch)
    }

    /// Run until both channels close or a [`SessionEvent::Shutdown`] arrives.
    ///
    /// Returns the final session for inspection.
    pub async fn run(
        mut self,
        mut events_rx: mpsc::Receiver<SessionEvent>,
        mut interrupt_rx: mpsc::Receiver<BoxEvent>,
    ) -> Session {
        log::info!("session loop started");

        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;

                interrupt = interrupt_rx.recv() => match interrupt {
                    Some(event) => self.handle_box_event(event).await,
                    None => break,
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.handle_timeout().await;
                }

                event = events_rx.recv() => match event {
                    Some(SessionEvent::Shutdown) => break,
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        log::info!("session loop stopped");
        self.session
    }

    // -----------------------------------------------------------------------
    // Box lid interrupts
    // -----------------------------------------------------------------------

    async fn handle_box_event(&mut self, event: BoxEvent) {
        match event {
            BoxEvent::Opened => {
                if self.session.state == ConversationState::Idle {
                    log::info!("box opened");
                    self.start_session().await;
                } else {
                    log::debug!(
                        "box opened while {}; ignoring",
                        self.session.state.label()
                    );
                }
            }
            BoxEvent::Closed => {
                if self.session.emergency {
                    log::warn!("box closed with emergency flag set");
                }
                log::info!("box closed; resetting session");
                self.reset_session();
            }
        }
    }

    async fn start_session(&mut self) {
        self.reset_session();
        self.session.open();
        let opening = prompts::opening(&self.config.user_name);
        self.say(&opening).await;
        self.arm(TimeoutKind::Short);
    }

    /// Drop everything about the current session and return to `Idle`.
    fn reset_session(&mut self) {
        self.deadline = None;
        self.confirming_done = false;
        self.capture_epoch.fetch_add(1, Ordering::SeqCst);
        self.session.reset();
        self.status.status_changed(AssistantStatus::Idle);
    }

    // -----------------------------------------------------------------------
    // Ordinary events
    // -----------------------------------------------------------------------

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::UtteranceCaptured(utterance) => {
                if self.session.state.accepts_speech() {
                    self.spawn_transcribe(utterance);
                } else if self.session.state == ConversationState::Idle {
                    log::debug!(
                        "dropping utterance ({:.2}s) while idle",
                        utterance.duration_secs()
                    );
                } else {
                    // Parked: transcribe only to look for a wake phrase.
                    self.spawn_wake_scan(utterance);
                }
            }
            SessionEvent::WakeWord(wake) => self.handle_wake_word(wake).await,
            SessionEvent::TranscriptReady { generation, text } => {
                self.handle_transcript(generation, text).await;
            }
            SessionEvent::NoInput { generation } => {
                if !self.session.is_current(generation) {
                    log::debug!("discarding stale no-input result");
                    return;
                }
                log::info!("no usable speech in utterance; re-prompting");
                self.say(&prompts::no_response()).await;
                self.arm_for_state();
            }
            SessionEvent::ExchangeComplete {
                generation,
                response,
                classification,
            } => {
                self.handle_exchange_complete(generation, response, classification)
                    .await;
            }
            SessionEvent::ExchangeFailed {
                generation,
                stage,
                message,
            } => {
                if !self.session.is_current(generation) {
                    log::debug!("discarding stale {} failure", stage.label());
                    return;
                }
                log::warn!("{} failed: {message}", stage.label());
                match stage {
                    ExchangeStage::Transcription => self.say(&prompts::no_response()).await,
                    ExchangeStage::Generation => self.say(&prompts::apology()).await,
                }
                self.arm_for_state();
            }
            SessionEvent::AudioFault(message) => {
                // The capture stream will not recover; keep the session
                // alive for hardware events and leave restart to the
                // process supervisor.
                log::error!("audio device fault: {message}");
            }
            SessionEvent::Shutdown => {}
        }
    }

    async fn handle_wake_word(&mut self, wake: crate::wake::WakeWordEvent) {
        match WakeWordGate::admit(self.session.state, wake) {
            Some(GateAction::StartSession | GateAction::ForceRestart) => {
                self.start_session().await;
            }
            Some(GateAction::StepComplete) => {
                // The step deadline is spent; no deadline runs while the
                // next instruction is being generated.
                self.deadline = None;
                self.session.state = ConversationState::ActiveAssistance;
                let history = self.chat_history();
                let text = "Step complete.".to_string();
                self.session.push_turn(Turn::user(text.clone()));
                self.spawn_generate(history, text);
            }
            None => {}
        }
    }

    async fn handle_transcript(&mut self, generation: u64, text: String) {
        if !self.session.is_current(generation) {
            log::debug!("discarding stale transcript: {text:?}");
            return;
        }
        log::info!("user said: {text:?}");
        self.deadline = None;

        // All-set confirmation after a procedure-done response.
        if self.confirming_done {
            self.confirming_done = false;
            if detect_all_set(&text) == Affirmation::Yes {
                self.session.push_turn(Turn::user(text));
                self.say(&prompts::closing()).await;
                self.park();
                return;
            }
            // Anything else means they still need help; fall through to a
            // normal exchange.
        }

        match self.session.state {
            ConversationState::Opening => match detect_affirmation(&text) {
                Affirmation::No => {
                    log::info!("help declined; parking on wake word");
                    self.session.push_turn(Turn::user(text));
                    self.say(&prompts::park_on_wake_word()).await;
                    self.park();
                }
                Affirmation::Yes | Affirmation::Unclear => {
                    self.session.state = ConversationState::ActiveAssistance;
                    self.begin_exchange(text);
                }
            },
            ConversationState::ActiveAssistance => self.begin_exchange(text),
            other => {
                log::debug!("transcript in {}; dropping", other.label());
            }
        }
    }

    /// Record the user turn and spawn generation for it.  No deadline runs
    /// while a response is being produced.
    fn begin_exchange(&mut self, text: String) {
        let history = self.chat_history();
        self.session.push_turn(Turn::user(text.clone()));
        self.spawn_generate(history, text);
    }

    async fn handle_exchange_complete(
        &mut self,
        generation: u64,
        response: String,
        classification: crate::classify::ClassificationResult,
    ) {
        if !self.session.is_current(generation) {
            log::debug!("discarding stale response: {response:?}");
            return;
        }
        log::info!("{classification}");
        self.session
            .push_turn(Turn::assistant(response.clone(), classification.clone()));

        match classification.outcome {
            Outcome::NeedMoreInfo => {
                self.session.state = ConversationState::ActiveAssistance;
                self.say(&response).await;
                self.arm(TimeoutKind::Normal);
            }
            Outcome::UserActionRequired => {
                self.session.state = ConversationState::WaitingForStepComplete;
                self.say(&response).await;
                if !has_completion_cue(&response) {
                    self.say(&prompts::step_complete_reminder()).await;
                }
                self.arm(TimeoutKind::Long);
            }
            Outcome::ProcedureDone => {
                // Confirm before parking; a "no" here resumes assistance.
                self.confirming_done = true;
                self.session.state = ConversationState::ActiveAssistance;
                self.say(&response).await;
                self.say(&prompts::confirm_all_set()).await;
                self.arm(TimeoutKind::Normal);
            }
            Outcome::Emergency => {
                if !self.session.emergency {
                    log::warn!("emergency flagged for this session");
                }
                self.session.emergency = true;
                self.session.state = ConversationState::ActiveAssistance;
                self.say(&response).await;
                self.arm(TimeoutKind::Normal);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timeouts
    // -----------------------------------------------------------------------

    async fn handle_timeout(&mut self) {
        // Abandon any capture in progress under the expired deadline.
        self.capture_epoch.fetch_add(1, Ordering::SeqCst);
        self.confirming_done = false;

        match self.session.state {
            ConversationState::Opening | ConversationState::ActiveAssistance => {
                log::info!(
                    "response timeout in {}; parking on wake word",
                    self.session.state.label()
                );
                self.say(&prompts::no_response()).await;
                self.park();
            }
            ConversationState::WaitingForStepComplete => {
                log::info!("step still in progress; re-prompting");
                self.say(&prompts::step_complete_reminder()).await;
                self.arm(TimeoutKind::Long);
            }
            ConversationState::Idle | ConversationState::WaitingForWakeWord => {}
        }
    }

    /// Arm the single response deadline, replacing any previous one.
    fn arm(&mut self, kind: TimeoutKind) {
        let timeouts = &self.config.timeouts;
        let secs = match kind {
            TimeoutKind::Short => timeouts.short_secs,
            TimeoutKind::Normal => timeouts.normal_secs,
            TimeoutKind::Long => timeouts.long_secs,
        };
        self.deadline = Some(Instant::now() + Duration::from_secs(secs));
    }

    /// Re-arm the deadline appropriate to the current state, if any.
    fn arm_for_state(&mut self) {
        match self.session.state {
            ConversationState::Opening => self.arm(TimeoutKind::Short),
            ConversationState::ActiveAssistance => self.arm(TimeoutKind::Normal),
            ConversationState::WaitingForStepComplete => self.arm(TimeoutKind::Long),
            ConversationState::Idle | ConversationState::WaitingForWakeWord => {
                self.deadline = None;
            }
        }
    }

    /// Park on the wake word, retaining history until reset.
    fn park(&mut self) {
        self.session.state = ConversationState::WaitingForWakeWord;
        self.deadline = None;
        self.status.status_changed(AssistantStatus::Idle);
    }

    // -----------------------------------------------------------------------
    // Pipeline tasks
    // -----------------------------------------------------------------------

    fn spawn_transcribe(&self, utterance: crate::audio::Utterance) {
        let generation = self.session.generation();
        let transcriber = Arc::clone(&self.transcriber);
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let event = match transcriber
                .transcribe(&utterance.samples, utterance.sample_rate)
                .await
            {
                Ok(Some(text)) => SessionEvent::TranscriptReady { generation, text },
                Ok(None) => SessionEvent::NoInput { generation },
                Err(err) => SessionEvent::ExchangeFailed {
                    generation,
                    stage: ExchangeStage::Transcription,
                    message: err.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    /// Transcribe a parked-state utterance and emit a wake event if it
    /// contains a wake phrase.  Everything else is discarded.
    fn spawn_wake_scan(&self, utterance: crate::audio::Utterance) {
        let transcriber = Arc::clone(&self.transcriber);
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            if let Ok(Some(text)) = transcriber
                .transcribe(&utterance.samples, utterance.sample_rate)
                .await
            {
                if let Some(kind) = crate::wake::scan_phrase(&text) {
                    let event = crate::wake::WakeWordEvent::now(kind);
                    let _ = tx.send(SessionEvent::WakeWord(event)).await;
                }
            }
        });
    }

    fn spawn_generate(&mut self, history: Vec<ChatMessage>, user_text: String) {
        let generation = self.session.generation();
        let generator = Arc::clone(&self.generator);
        let classifier = Arc::clone(&self.classifier);
        let context = self
            .session
            .recent_assistant_texts(self.config.classifier.context_window);
        let tx = self.events_tx.clone();

        self.status.status_changed(AssistantStatus::Speaking);

        tokio::spawn(async move {
            let event = match generator.generate(&history, &user_text).await {
                Ok(response) => {
                    let classification = classifier.classify(&response, &context).await;
                    SessionEvent::ExchangeComplete {
                        generation,
                        response,
                        classification,
                    }
                }
                Err(err) => SessionEvent::ExchangeFailed {
                    generation,
                    stage: ExchangeStage::Generation,
                    message: err.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    /// Session history as chat messages, oldest first.
    fn chat_history(&self) -> Vec<ChatMessage> {
        self.session
            .history()
            .map(|turn| match turn.speaker {
                TurnSpeaker::User => ChatMessage::user(turn.text.clone()),
                TurnSpeaker::Assistant => ChatMessage::assistant(turn.text.clone()),
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    async fn say(&self, text: &str) {
        self.status.status_changed(AssistantStatus::Speaking);
        self.speaker.say(text).await;
        self.status.status_changed(self.status_for_state());
    }

    fn status_for_state(&self) -> AssistantStatus {
        match self.session.state {
            ConversationState::Idle | ConversationState::WaitingForWakeWord => {
                AssistantStatus::Idle
            }
            _ => AssistantStatus::Listening,
        }
    }
}

/// True when an instruction already tells the user how to confirm the step.
fn has_completion_cue(response: &str) -> bool {
    let lowered = response.to_lowercase();
    lowered.contains("step complete") || lowered.contains("let me know")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::classify::{ClassificationResult, ClassifierSource};
    use crate::llm::GenError;
    use crate::speech::TranscribeError;
    use crate::wake::{WakeWordEvent, WakeWordKind};

    // ---- mocks ---

    struct OkTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for OkTranscriber {
        async fn transcribe(
            &self,
            _samples: &[f32],
            _sample_rate: u32,
        ) -> Result<Option<String>, TranscribeError> {
            Ok(Some(self.0.to_string()))
        }
    }

    struct OkGenerator(&'static str);

    #[async_trait]
    impl ResponseGenerator for OkGenerator {
        async fn generate(
            &self,
            _history: &[ChatMessage],
            _user_text: &str,
        ) -> Result<String, GenError> {
            Ok(self.0.to_string())
        }
    }

    struct FailGenerator;

    #[async_trait]
    impl ResponseGenerator for FailGenerator {
        async fn generate(
            &self,
            _history: &[ChatMessage],
            _user_text: &str,
        ) -> Result<String, GenError> {
            Err(GenError::Timeout)
        }
    }

    /// Records everything spoken.
    struct RecordingSpeaker(Mutex<Vec<String>>);

    impl RecordingSpeaker {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn spoken(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Speaker for RecordingSpeaker {
        async fn say(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    struct NullSink;

    impl StatusSink for NullSink {
        fn status_changed(&self, _status: AssistantStatus) {}
    }

    fn result(outcome: Outcome) -> ClassificationResult {
        ClassificationResult::new(outcome, 0.9, ClassifierSource::Keyword, "test")
    }

    fn make_runner(
        generator: Arc<dyn ResponseGenerator>,
    ) -> (SessionRunner, Arc<RecordingSpeaker>, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let speaker = RecordingSpeaker::new();
        let classifier = Arc::new(OutcomeClassifier::new(
            crate::config::ClassifierConfig::default(),
            None,
        ));
        let runner = SessionRunner::new(
            AppConfig::default(),
            Arc::new(OkTranscriber("yes")),
            generator,
            classifier,
            speaker.clone(),
            Arc::new(NullSink),
            tx,
        );
        (runner, speaker, rx)
    }

    fn default_runner() -> (SessionRunner, Arc<RecordingSpeaker>, mpsc::Receiver<SessionEvent>)
    {
        make_runner(Arc::new(OkGenerator("Where exactly is the cut?")))
    }

    // ---- opening ---

    #[tokio::test]
    async fn box_open_starts_opening_exchange() {
        let (mut runner, speaker, _rx) = default_runner();
        runner.handle_box_event(BoxEvent::Opened).await;

        assert_eq!(runner.session.state, ConversationState::Opening);
        assert!(runner.deadline.is_some());
        let spoken = speaker.spoken();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].contains("Solstis"));
    }

    #[tokio::test]
    async fn box_open_while_active_is_ignored() {
        let (mut runner, speaker, _rx) = default_runner();
        runner.handle_box_event(BoxEvent::Opened).await;
        runner.handle_box_event(BoxEvent::Opened).await;

        assert_eq!(runner.session.state, ConversationState::Opening);
        assert_eq!(speaker.spoken().len(), 1);
    }

    #[tokio::test]
    async fn opening_affirmation_moves_to_active() {
        let (mut runner, _speaker, _rx) = default_runner();
        runner.handle_box_event(BoxEvent::Opened).await;
        let generation = runner.session.generation();

        runner
            .handle_transcript(generation, "yes, I cut my finger".into())
            .await;

        assert_eq!(runner.session.state, ConversationState::ActiveAssistance);
        assert_eq!(runner.session.history_len(), 1);
    }

    #[tokio::test]
    async fn opening_decline_parks_on_wake_word() {
        let (mut runner, speaker, _rx) = default_runner();
        runner.handle_box_event(BoxEvent::Opened).await;
        let generation = runner.session.generation();

        runner.handle_transcript(generation, "no thanks".into()).await;

        assert_eq!(runner.session.state, ConversationState::WaitingForWakeWord);
        assert!(runner.deadline.is_none());
        assert!(speaker.spoken().last().unwrap().contains("SOLSTIS"));
    }

    // ---- classification-driven transitions ---

    async fn active_runner() -> (SessionRunner, Arc<RecordingSpeaker>, mpsc::Receiver<SessionEvent>)
    {
        let (mut runner, speaker, rx) = default_runner();
        runner.handle_box_event(BoxEvent::Opened).await;
        runner.session.state = ConversationState::ActiveAssistance;
        (runner, speaker, rx)
    }

    #[tokio::test]
    async fn need_more_info_keeps_conversing() {
        let (mut runner, speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();

        runner
            .handle_exchange_complete(
                generation,
                "Where exactly is the cut?".into(),
                result(Outcome::NeedMoreInfo),
            )
            .await;

        assert_eq!(runner.session.state, ConversationState::ActiveAssistance);
        assert!(runner.deadline.is_some());
        assert!(speaker.spoken().last().unwrap().contains("Where exactly"));
    }

    #[tokio::test]
    async fn user_action_waits_for_step_complete() {
        let (mut runner, _speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();

        runner
            .handle_exchange_complete(
                generation,
                "Apply pressure with the gauze. Say step complete when you're done.".into(),
                result(Outcome::UserActionRequired),
            )
            .await;

        assert_eq!(
            runner.session.state,
            ConversationState::WaitingForStepComplete
        );
        assert!(runner.deadline.is_some());
    }

    #[tokio::test]
    async fn instruction_without_cue_gets_a_reminder() {
        let (mut runner, speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();

        runner
            .handle_exchange_complete(
                generation,
                "Apply pressure with the gauze.".into(),
                result(Outcome::UserActionRequired),
            )
            .await;

        let spoken = speaker.spoken();
        assert!(spoken.last().unwrap().contains("STEP COMPLETE"));
    }

    #[tokio::test]
    async fn procedure_done_confirms_then_parks_on_yes() {
        let (mut runner, speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();

        runner
            .handle_exchange_complete(
                generation,
                "You're all set.".into(),
                result(Outcome::ProcedureDone),
            )
            .await;

        // Confirmation question asked; still conversing.
        assert_eq!(runner.session.state, ConversationState::ActiveAssistance);
        assert!(speaker.spoken().last().unwrap().contains("all set"));

        runner.handle_transcript(generation, "yes".into()).await;

        assert_eq!(runner.session.state, ConversationState::WaitingForWakeWord);
        assert!(runner.deadline.is_none());
        // History survives parking; only reset discards it.
        assert!(runner.session.history_len() > 0);
    }

    #[tokio::test]
    async fn procedure_done_confirmation_declined_resumes() {
        let (mut runner, _speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();

        runner
            .handle_exchange_complete(
                generation,
                "You're all set.".into(),
                result(Outcome::ProcedureDone),
            )
            .await;
        runner
            .handle_transcript(generation, "actually my hand still hurts".into())
            .await;

        assert_eq!(runner.session.state, ConversationState::ActiveAssistance);
        assert!(!runner.confirming_done);
    }

    #[tokio::test]
    async fn emergency_sets_sticky_flag_and_keeps_assisting() {
        let (mut runner, _speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();

        runner
            .handle_exchange_complete(
                generation,
                "Call 911 now.".into(),
                result(Outcome::Emergency),
            )
            .await;
        assert!(runner.session.emergency);
        assert_eq!(runner.session.state, ConversationState::ActiveAssistance);

        runner
            .handle_exchange_complete(
                generation,
                "Where exactly is the wound?".into(),
                result(Outcome::NeedMoreInfo),
            )
            .await;
        // Sticky until reset.
        assert!(runner.session.emergency);
    }

    // ---- staleness ---

    #[tokio::test]
    async fn stale_results_are_discarded_after_reset() {
        let (mut runner, _speaker, _rx) = active_runner().await;
        let stale = runner.session.generation();

        runner.handle_box_event(BoxEvent::Closed).await;
        runner
            .handle_exchange_complete(
                stale,
                "Where exactly is the cut?".into(),
                result(Outcome::NeedMoreInfo),
            )
            .await;

        assert_eq!(runner.session.state, ConversationState::Idle);
        assert_eq!(runner.session.history_len(), 0);
        assert!(runner.deadline.is_none());
    }

    #[tokio::test]
    async fn stale_transcript_is_discarded() {
        let (mut runner, _speaker, _rx) = active_runner().await;
        let stale = runner.session.generation();

        runner.handle_box_event(BoxEvent::Closed).await;
        runner.handle_transcript(stale, "yes".into()).await;

        assert_eq!(runner.session.state, ConversationState::Idle);
        assert_eq!(runner.session.history_len(), 0);
    }

    // ---- box close ---

    #[tokio::test]
    async fn box_close_resets_from_every_state() {
        for outcome in [Outcome::UserActionRequired, Outcome::Emergency] {
            let (mut runner, _speaker, _rx) = active_runner().await;
            let generation = runner.session.generation();
            runner
                .handle_exchange_complete(generation, "Do the thing.".into(), result(outcome))
                .await;

            runner.handle_box_event(BoxEvent::Closed).await;

            assert_eq!(runner.session.state, ConversationState::Idle);
            assert_eq!(runner.session.history_len(), 0);
            assert!(!runner.session.emergency);
            assert!(runner.deadline.is_none());
        }
    }

    #[tokio::test]
    async fn box_close_bumps_capture_epoch() {
        let (mut runner, _speaker, _rx) = default_runner();
        let epoch = runner.capture_epoch();
        let before = epoch.load(Ordering::SeqCst);

        runner.handle_box_event(BoxEvent::Closed).await;

        assert!(epoch.load(Ordering::SeqCst) > before);
    }

    // ---- timeouts ---

    #[tokio::test]
    async fn opening_timeout_parks_once() {
        let (mut runner, speaker, _rx) = default_runner();
        runner.handle_box_event(BoxEvent::Opened).await;

        runner.deadline = None;
        runner.handle_timeout().await;

        assert_eq!(runner.session.state, ConversationState::WaitingForWakeWord);
        assert!(runner.deadline.is_none());
        assert!(speaker.spoken().last().unwrap().contains("no response"));
    }

    #[tokio::test]
    async fn step_timeout_reprompts_and_remains() {
        let (mut runner, speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();
        runner
            .handle_exchange_complete(
                generation,
                "Apply the gauze. Say step complete when you're done.".into(),
                result(Outcome::UserActionRequired),
            )
            .await;

        runner.deadline = None;
        runner.handle_timeout().await;

        assert_eq!(
            runner.session.state,
            ConversationState::WaitingForStepComplete
        );
        assert!(runner.deadline.is_some());
        assert!(speaker.spoken().last().unwrap().contains("STEP COMPLETE"));
    }

    #[tokio::test]
    async fn arming_replaces_the_previous_deadline() {
        let (mut runner, _speaker, _rx) = default_runner();
        runner.arm(TimeoutKind::Long);
        let first = runner.deadline;
        runner.arm(TimeoutKind::Short);
        // One slot; the new deadline replaced the old.
        assert!(runner.deadline.is_some());
        assert_ne!(runner.deadline, first);
    }

    // ---- wake words ---

    #[tokio::test]
    async fn step_complete_wake_word_resumes_assistance() {
        let (mut runner, _speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();
        runner
            .handle_exchange_complete(
                generation,
                "Apply the gauze. Let me know when you're done.".into(),
                result(Outcome::UserActionRequired),
            )
            .await;

        runner
            .handle_wake_word(WakeWordEvent::now(WakeWordKind::StepComplete))
            .await;

        assert_eq!(runner.session.state, ConversationState::ActiveAssistance);
        let last = runner.session.history().last().unwrap();
        assert_eq!(last.speaker, TurnSpeaker::User);
        assert_eq!(last.text, "Step complete.");
    }

    #[tokio::test]
    async fn step_complete_wake_word_clears_the_step_deadline() {
        let (mut runner, _speaker, _rx) = active_runner().await;
        let generation = runner.session.generation();
        runner
            .handle_exchange_complete(
                generation,
                "Apply the gauze. Let me know when you're done.".into(),
                result(Outcome::UserActionRequired),
            )
            .await;
        assert!(runner.deadline.is_some());

        runner
            .handle_wake_word(WakeWordEvent::now(WakeWordKind::StepComplete))
            .await;

        // No deadline may run while the next instruction is generated; a
        // stale one firing here would speak the no-response prompt and park
        // the session right after the user responded.
        assert!(runner.deadline.is_none());
        assert_eq!(runner.session.state, ConversationState::ActiveAssistance);
    }

    #[tokio::test]
    async fn session_start_wake_word_restarts_mid_session() {
        let (mut runner, _speaker, _rx) = active_runner().await;
        runner.session.push_turn(Turn::user("old turn"));
        let before = runner.session.generation();

        runner
            .handle_wake_word(WakeWordEvent::now(WakeWordKind::SessionStart))
            .await;

        assert_eq!(runner.session.state, ConversationState::Opening);
        assert_eq!(runner.session.history_len(), 0);
        assert!(runner.session.generation() > before);
    }

    // ---- pipeline failures ---

    #[tokio::test]
    async fn generation_failure_apologizes_and_rearms() {
        let (mut runner, speaker, _rx) = make_runner(Arc::new(FailGenerator));
        runner.handle_box_event(BoxEvent::Opened).await;
        runner.session.state = ConversationState::ActiveAssistance;
        let generation = runner.session.generation();

        runner
            .handle_event(SessionEvent::ExchangeFailed {
                generation,
                stage: ExchangeStage::Generation,
                message: "timed out".into(),
            })
            .await;

        assert_eq!(runner.session.state, ConversationState::ActiveAssistance);
        assert!(runner.deadline.is_some());
        assert!(speaker.spoken().last().unwrap().contains("sorry"));
    }

    fn utterance() -> crate::audio::Utterance {
        crate::audio::Utterance {
            samples: vec![0.0; 4800],
            sample_rate: 16_000,
            started_at: std::time::Instant::now(),
            ended_at: std::time::Instant::now(),
            ambient_rms: 0.01,
        }
    }

    #[tokio::test]
    async fn parked_utterance_without_wake_phrase_is_discarded() {
        let (mut runner, _speaker, mut rx) = default_runner();
        runner.session.state = ConversationState::WaitingForWakeWord;

        runner
            .handle_event(SessionEvent::UtteranceCaptured(utterance()))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Transcript "yes" carries no wake phrase; nothing is emitted.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn parked_utterance_with_wake_phrase_emits_event() {
        let (mut runner, _speaker, mut rx) =
            make_runner(Arc::new(OkGenerator("ok")));
        runner.transcriber = Arc::new(OkTranscriber("hey solstis, I need you"));
        runner.session.state = ConversationState::WaitingForWakeWord;

        runner
            .handle_event(SessionEvent::UtteranceCaptured(utterance()))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        match rx.try_recv() {
            Ok(SessionEvent::WakeWord(event)) => {
                assert_eq!(event.kind, WakeWordKind::SessionStart);
            }
            other => panic!("expected a wake event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_utterance_is_dropped() {
        let (mut runner, _speaker, mut rx) = default_runner();

        runner
            .handle_event(SessionEvent::UtteranceCaptured(utterance()))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(rx.try_recv().is_err());
    }

    // ---- full loop ---

    #[tokio::test]
    async fn run_loop_processes_an_opening_over_channels() {
        let (tx, rx) = mpsc::channel(16);
        let (itx, irx) = mpsc::channel(4);
        let speaker = RecordingSpeaker::new();
        let classifier = Arc::new(OutcomeClassifier::new(
            crate::config::ClassifierConfig::default(),
            None,
        ));
        let runner = SessionRunner::new(
            AppConfig::default(),
            Arc::new(OkTranscriber("yes")),
            Arc::new(OkGenerator("Where exactly is the cut?")),
            classifier,
            speaker.clone(),
            Arc::new(NullSink),
            tx.clone(),
        );

        let handle = tokio::spawn(runner.run(rx, irx));

        itx.send(BoxEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(SessionEvent::Shutdown).await.unwrap();

        let session = handle.await.unwrap();
        assert_eq!(session.state, ConversationState::Opening);
        assert!(speaker.spoken()[0].contains("Solstis"));
    }

    #[tokio::test]
    async fn run_loop_box_close_preempts_queued_events() {
        let (tx, rx) = mpsc::channel(16);
        let (itx, irx) = mpsc::channel(4);
        let speaker = RecordingSpeaker::new();
        let classifier = Arc::new(OutcomeClassifier::new(
            crate::config::ClassifierConfig::default(),
            None,
        ));
        let runner = SessionRunner::new(
            AppConfig::default(),
            Arc::new(OkTranscriber("yes")),
            Arc::new(OkGenerator("ok")),
            classifier,
            speaker.clone(),
            Arc::new(NullSink),
            tx.clone(),
        );

        let handle = tokio::spawn(runner.run(rx, irx));

        itx.send(BoxEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        itx.send(BoxEvent::Closed).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(SessionEvent::Shutdown).await.unwrap();

        let session = handle.await.unwrap();
        assert_eq!(session.state, ConversationState::Idle);
        assert_eq!(session.history_len(), 0);
    }
}
