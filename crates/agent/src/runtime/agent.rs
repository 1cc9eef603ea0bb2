//! `Agent`: one session's conversation, bound to its collaborators.
//!
//! Owns the canonical history, persists every produced message and
//! serializes turns through the session lock so a user turn and an
//! autoplay turn never interleave.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use ra_domain::config::Config;
use ra_domain::tool::Message;
use ra_sessions::MessageStore;

use crate::backend::ModelBackend;
use crate::compress::HistoryCompressor;
use crate::display::{DisplaySink, NullSink};
use crate::gateway::ToolGateway;

use super::autoplay::AutoplayTurn;
use super::cancel::CancelMap;
use super::history::ConversationHistory;
use super::session_lock::SessionLockMap;
use super::turn::{run_turn, TurnContext, TurnOutcome};
use super::TurnError;

pub struct Agent {
    session_id: String,
    backend: Arc<dyn ModelBackend>,
    gateway: Arc<ToolGateway>,
    compressor: HistoryCompressor,
    store: Arc<dyn MessageStore>,
    sink: Arc<dyn DisplaySink>,
    history: ConversationHistory,
    locks: SessionLockMap,
    cancels: CancelMap,
    max_rounds: u32,
    keep_full_turns: usize,
}

impl Agent {
    /// Build an agent for `session_id`, seeding the history from `store`.
    /// A store that fails to load is reported and treated as empty.
    pub fn new(
        session_id: impl Into<String>,
        config: &Config,
        backend: Arc<dyn ModelBackend>,
        gateway: Arc<ToolGateway>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let session_id = session_id.into();
        let history = match store.load_messages(&session_id) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "failed to load history, starting empty");
                Vec::new()
            }
        };
        tracing::debug!(session_id = %session_id, messages = history.len(), "agent ready");

        let agent = Self {
            session_id,
            backend,
            gateway,
            compressor: HistoryCompressor::new(config.compression.clone()),
            store,
            sink: Arc::new(NullSink),
            history: ConversationHistory::new(history),
            locks: SessionLockMap::new(),
            cancels: CancelMap::new(),
            max_rounds: config.turn.max_rounds,
            keep_full_turns: config.compression.keep_full_turns,
        };
        agent.ensure_system_prompt(&config.turn.system_prompt);
        agent
    }

    pub fn with_sink(mut self, sink: Arc<dyn DisplaySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn gateway(&self) -> &Arc<ToolGateway> {
        &self.gateway
    }

    pub fn history(&self) -> Vec<Message> {
        self.history.snapshot()
    }

    /// Make `prompt` the leading system message. A loaded session whose
    /// transcript starts with an older prompt gets it replaced in memory.
    /// Persisted only when it starts a new session, so a reloaded
    /// transcript keeps its order.
    pub fn ensure_system_prompt(&self, prompt: &str) -> bool {
        if prompt.trim().is_empty() {
            return false;
        }
        let message = Message::system(prompt);
        let was_empty = self.history.is_empty();
        if !self.history.set_system_prompt(message.clone()) {
            return false;
        }
        if was_empty {
            self.persist(&message);
        } else {
            tracing::debug!(session_id = %self.session_id, "system prompt applied to loaded history");
        }
        true
    }

    /// Run one user turn. Waits for any turn already running on this
    /// session. Cancelling `cancel` (or calling [`Agent::cancel_turn`])
    /// aborts the turn; messages emitted so far are kept.
    pub async fn send_message(&self, text: &str, cancel: &CancellationToken) -> Result<TurnOutcome, TurnError> {
        self.execute(text, cancel, true).await
    }

    /// Cancel the foreground turn, if one is running.
    pub fn cancel_turn(&self) -> bool {
        self.cancels.cancel(&self.session_id)
    }

    async fn execute(&self, text: &str, cancel: &CancellationToken, foreground: bool) -> Result<TurnOutcome, TurnError> {
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!("agent_turn", session_id = %self.session_id, %turn_id, foreground);

        async {
            let _guard = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                guard = self.locks.acquire(&self.session_id) => guard,
            };

            // Dropped before the session guard, also when this future is.
            let registration = foreground.then(|| self.cancels.register(&self.session_id, cancel));
            let token = match &registration {
                Some(r) => r.token().clone(),
                None => cancel.child_token(),
            };

            self.record(Message::user(text));

            let recorder = Recorder { agent: self };
            let ctx = TurnContext {
                session_id: &self.session_id,
                backend: self.backend.as_ref(),
                gateway: self.gateway.as_ref(),
                compressor: &self.compressor,
                sink: &recorder,
                max_rounds: self.max_rounds,
                keep_full_turns: self.keep_full_turns,
            };
            let result = run_turn(&ctx, self.history.snapshot(), &token).await;
            drop(registration);

            match &result {
                Ok(outcome) => tracing::info!(rounds = outcome.rounds, "turn complete"),
                Err(e) => {
                    tracing::warn!(error = %e, "turn failed");
                    self.sink.on_error(&e.to_string());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Append to the canonical history, persist, then display.
    fn record(&self, message: Message) {
        self.persist(&message);
        self.sink.on_message(&message);
        self.history.append(message);
    }

    fn persist(&self, message: &Message) {
        if let Err(e) = self.store.save_message(&self.session_id, message) {
            tracing::warn!(session_id = %self.session_id, error = %e, "failed to persist message");
            self.sink.on_warning(&format!("failed to persist message: {e}"));
        }
    }
}

/// Autoplay turns use a token nobody else holds, so neither stopping
/// autoplay nor `cancel_turn` can abort them.
#[async_trait::async_trait]
impl AutoplayTurn for Agent {
    async fn run_autoplay_turn(&self, message: &str) -> Result<(), TurnError> {
        self.execute(message, &CancellationToken::new(), false)
            .await
            .map(|_| ())
    }
}

/// Turn-engine sink that records messages before forwarding them.
struct Recorder<'a> {
    agent: &'a Agent,
}

impl DisplaySink for Recorder<'_> {
    fn on_message(&self, message: &Message) {
        self.agent.record(message.clone());
    }

    fn on_tool_call_start(&self) {
        self.agent.sink.on_tool_call_start();
    }

    fn on_reasoning(&self, reasoning: &str) {
        self.agent.sink.on_reasoning(reasoning);
    }

    fn on_error(&self, error: &str) {
        self.agent.sink.on_error(error);
    }

    fn on_warning(&self, warning: &str) {
        self.agent.sink.on_warning(warning);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use ra_domain::config::AutoplayConfig;
    use ra_domain::error::{Error, Result as DomainResult};
    use ra_domain::tool::{Role, ToolDefinition};
    use ra_sessions::{JsonlStore, MemoryStore};

    use super::*;
    use crate::backend::{BackendError, ChatResponse};
    use crate::display::{ChannelSink, TurnEvent};
    use crate::runtime::autoplay::{AutoplayCoordinator, NullObserver};
    use crate::testing::{assert_no_orphans, call, HangingBackend, RecordingTool, ScriptedBackend};

    fn gateway() -> Arc<ToolGateway> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut gateway = ToolGateway::new(None);
        gateway.register(RecordingTool::new("get_status", &log));
        Arc::new(gateway)
    }

    fn agent(backend: Arc<dyn ModelBackend>, store: Arc<dyn MessageStore>) -> Agent {
        Agent::new("s1", &Config::default(), backend, gateway(), store)
    }

    #[tokio::test]
    async fn turn_messages_are_recorded_and_persisted() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ChatResponse::tools(vec![call("c1", "get_status")])),
            Ok(ChatResponse::text("all good")),
        ]));
        let store = Arc::new(MemoryStore::new());
        let (sink, mut rx) = ChannelSink::new();
        let agent = agent(backend, store.clone()).with_sink(Arc::new(sink));

        let outcome = agent.send_message("status?", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.reply, "all good");

        let history = agent.history();
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_no_orphans(&history);
        assert_eq!(store.load_messages("s1").unwrap(), history);

        let mut displayed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TurnEvent::Message { message } = event {
                displayed.push(message);
            }
        }
        assert_eq!(displayed, history);
    }

    #[tokio::test]
    async fn next_turn_sees_previous_turns() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(ChatResponse::text("first")),
            Ok(ChatResponse::text("second")),
        ]));
        let agent = agent(backend.clone(), Arc::new(MemoryStore::new()));

        agent.send_message("one", &CancellationToken::new()).await.unwrap();
        agent.send_message("two", &CancellationToken::new()).await.unwrap();

        let seen = backend.seen.lock();
        let contents: Vec<&str> = seen[1].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "first", "two"]);
    }

    #[tokio::test]
    async fn history_is_loaded_from_store() {
        let store = Arc::new(MemoryStore::new());
        store.save_message("s1", &Message::user("earlier")).unwrap();
        store.save_message("s1", &Message::assistant("reply")).unwrap();

        let agent = agent(Arc::new(ScriptedBackend::default()), store);
        assert_eq!(agent.history().len(), 2);
    }

    #[tokio::test]
    async fn system_prompt_is_seeded_once() {
        let store = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.turn.system_prompt = "You are a space pilot.".into();

        let agent = Agent::new("s1", &config, Arc::new(ScriptedBackend::default()), gateway(), store.clone());
        assert!(!agent.ensure_system_prompt("You are a space pilot."));
        assert_eq!(agent.history().len(), 1);
        assert_eq!(agent.history()[0].role, Role::System);

        // A reloaded session already carries it.
        let reloaded = Agent::new("s1", &config, Arc::new(ScriptedBackend::default()), gateway(), store.clone());
        assert_eq!(reloaded.history().len(), 1);
        assert_eq!(store.load_messages("s1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn changed_system_prompt_replaces_persisted_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlStore::open(dir.path()).unwrap());
        store.save_message("s1", &Message::system("You are a miner.")).unwrap();
        store.save_message("s1", &Message::user("hello")).unwrap();

        let mut config = Config::default();
        config.turn.system_prompt = "You are a trader.".into();
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(ChatResponse::text("hi"))]));
        let agent = Agent::new("s1", &config, backend.clone(), gateway(), store.clone());

        let history = agent.history();
        let systems: Vec<&str> = history
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(systems, vec!["You are a trader."]);
        assert_eq!(history[0].role, Role::System);

        agent.send_message("trade", &CancellationToken::new()).await.unwrap();
        let sent = backend.seen.lock()[0].clone();
        assert_eq!(sent.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(sent[0].content, "You are a trader.");

        // The transcript is not rewritten; reloading applies the prompt again.
        let reloaded = Agent::new("s1", &config, Arc::new(ScriptedBackend::default()), gateway(), store);
        assert_eq!(reloaded.history()[0].content, "You are a trader.");
        assert_eq!(reloaded.history().iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_turn_unregisters_its_cancel_handle() {
        let agent = Arc::new(agent(Arc::new(HangingBackend), Arc::new(MemoryStore::new())));

        let timed_out = tokio::time::timeout(
            Duration::from_millis(1),
            agent.send_message("hello", &CancellationToken::new()),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!agent.cancel_turn());

        // The session is free again and the next turn is cancellable.
        let next = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.send_message("again", &CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(agent.cancel_turn());
        assert!(matches!(next.await.unwrap(), Err(TurnError::Cancelled)));
        assert!(!agent.cancel_turn());
    }

    /// Sleeps inside every call and tracks how many calls overlap.
    #[derive(Default)]
    struct SlowBackend {
        active: AtomicU32,
        max_active: AtomicU32,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait::async_trait]
    impl ModelBackend for SlowBackend {
        async fn chat_with_tools(
            &self,
            history: &[Message],
            _tools: &[ToolDefinition],
        ) -> std::result::Result<ChatResponse, BackendError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().push(history.to_vec());
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ChatResponse::text(format!("reply {}", history.len())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn turns_on_one_session_are_single_flight() {
        let backend = Arc::new(SlowBackend::default());
        let agent = Arc::new(agent(backend.clone(), Arc::new(MemoryStore::new())));

        let user = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.send_message("user turn", &CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        let auto = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run_autoplay_turn("autoplay turn").await })
        };

        user.await.unwrap().unwrap();
        auto.await.unwrap().unwrap();

        assert_eq!(backend.max_active.load(Ordering::SeqCst), 1);
        let seen = backend.seen.lock();
        assert_eq!(seen.len(), 2);
        // The second turn starts from the completed first turn.
        assert_eq!(seen[1].len(), 3);
        assert_eq!(seen[1][1].content, "reply 1");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_turn_aborts_foreground_turn() {
        let agent = Arc::new(agent(Arc::new(HangingBackend), Arc::new(MemoryStore::new())));

        let running = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.send_message("hello", &CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(agent.cancel_turn());

        let err = running.await.unwrap().unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));
        assert!(!agent.cancel_turn());
        assert_eq!(agent.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_turn_leaves_autoplay_turns_alone() {
        let backend = Arc::new(SlowBackend::default());
        let agent = Arc::new(agent(backend, Arc::new(MemoryStore::new())));

        let auto = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.run_autoplay_turn("keep going").await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!agent.cancel_turn());
        auto.await.unwrap().unwrap();
    }

    struct FailingStore;

    impl MessageStore for FailingStore {
        fn save_message(&self, _session_id: &str, _message: &Message) -> DomainResult<()> {
            Err(Error::Store("disk full".into()))
        }

        fn load_messages(&self, _session_id: &str) -> DomainResult<Vec<Message>> {
            Err(Error::Store("unreadable".into()))
        }
    }

    #[tokio::test]
    async fn persistence_failure_is_only_a_warning() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(ChatResponse::text("fine"))]));
        let (sink, mut rx) = ChannelSink::new();
        let agent = agent(backend, Arc::new(FailingStore)).with_sink(Arc::new(sink));

        agent.send_message("hi", &CancellationToken::new()).await.unwrap();
        assert_eq!(agent.history().len(), 2);

        let warnings = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, TurnEvent::Warning { .. }))
            .count();
        assert_eq!(warnings, 2);
    }

    #[tokio::test]
    async fn failed_turn_is_reported_once() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(BackendError::Auth("bad key".into()))]));
        let (sink, mut rx) = ChannelSink::new();
        let agent = agent(backend, Arc::new(MemoryStore::new())).with_sink(Arc::new(sink));

        assert!(agent.send_message("hi", &CancellationToken::new()).await.is_err());
        let errors = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, TurnEvent::Error { .. }))
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_drives_the_agent() {
        let backend = Arc::new(ScriptedBackend::default());
        let agent = Arc::new(agent(backend.clone(), Arc::new(MemoryStore::new())));
        let config = AutoplayConfig {
            interval_secs: 75,
            max_consecutive_errors: 3,
        };
        let autoplay = AutoplayCoordinator::new("s1", &config, agent.clone(), Arc::new(NullObserver));

        autoplay.start("continue playing").unwrap();
        tokio::time::sleep(Duration::from_secs(80)).await;
        autoplay.stop().unwrap();

        assert_eq!(backend.calls(), 2);
        let users = agent
            .history()
            .into_iter()
            .filter(|m| m.role == Role::User)
            .filter(|m| m.content == "continue playing")
            .count();
        assert_eq!(users, 2);
    }
}
