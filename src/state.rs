//! Application state: collaborators (model, sink, prompt builder) and the
//! per-session handles.
//!
//! Sessions are independent: each owns its own `Session` value behind a
//! mutex plus a watch channel that carries the latest view to subscribers
//! (the WebSocket loop, tests).
//!
//! HTTP sessions have no disconnect to hang cleanup on, so a background
//! sweep drops sessions that have been idle past the configured TTL and have
//! nobody watching them.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{ServiceConfig, SessionSettings};
use crate::llm::{self, TextModel};
use crate::prompt::PromptBuilder;
use crate::protocol::{to_view, SessionView};
use crate::session::{Effect, Event, Session, SessionError};
use crate::sink::{self, SubmissionSink};

pub struct SessionHandle {
    session: Mutex<Session>,
    updates: watch::Sender<SessionView>,
    created: Instant,
    // Milliseconds after `created` of the last read or event.
    touched_ms: AtomicU64,
}

impl SessionHandle {
    pub fn new(id: Uuid) -> Arc<Self> {
        let session = Session::new(id);
        let (updates, _) = watch::channel(to_view(&session));
        Arc::new(Self {
            session: Mutex::new(session),
            updates,
            created: Instant::now(),
            touched_ms: AtomicU64::new(0),
        })
    }

    fn touch(&self) {
        let now = self.created.elapsed().as_millis() as u64;
        self.touched_ms.fetch_max(now, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let touched = Duration::from_millis(self.touched_ms.load(Ordering::Relaxed));
        self.created.elapsed().saturating_sub(touched)
    }

    pub fn has_watchers(&self) -> bool {
        self.updates.receiver_count() > 0
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.updates.subscribe()
    }

    pub async fn view(&self) -> SessionView {
        self.touch();
        to_view(&*self.session.lock().await)
    }

    /// Run one event through the reducer and publish the resulting view.
    /// The lock is never held across an await on IO.
    pub async fn apply(&self, event: Event) -> Result<(SessionView, Option<Effect>), SessionError> {
        self.touch();
        let mut session = self.session.lock().await;
        let effect = session.apply(event)?;
        let view = to_view(&session);
        self.updates.send_replace(view.clone());
        Ok((view, effect))
    }
}

pub struct AppState {
    pub model: Arc<dyn TextModel>,
    pub sink: Arc<dyn SubmissionSink>,
    pub prompts: PromptBuilder,
    pub sessions: RwLock<HashMap<Uuid, Arc<SessionHandle>>>,
    pub session_settings: SessionSettings,
}

impl AppState {
    /// Build state from env: load config, pick model backend and sink.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = ServiceConfig::load_from_env();
        let model = llm::from_env(&cfg.model);
        let sink = sink::from_env();
        info!(target: "evocode_backend", model = %model.name(), sink = %sink.name(), language = %cfg.prompts.language, "Application state ready");
        Self::with_parts(PromptBuilder::new(cfg.prompts), model, sink).with_session_settings(cfg.sessions)
    }

    pub fn with_parts(prompts: PromptBuilder, model: Arc<dyn TextModel>, sink: Arc<dyn SubmissionSink>) -> Self {
        Self {
            model,
            sink,
            prompts,
            sessions: RwLock::new(HashMap::new()),
            session_settings: SessionSettings::default(),
        }
    }

    pub fn with_session_settings(mut self, settings: SessionSettings) -> Self {
        self.session_settings = settings;
        self
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn create_session(&self) -> Arc<SessionHandle> {
        let id = Uuid::new_v4();
        let handle = SessionHandle::new(id);
        self.sessions.write().await.insert(id, handle.clone());
        info!(target: "session", %id, "Session created");
        handle
    }

    pub async fn get_session(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// In-flight work for a removed session still completes; its results go
    /// to the orphaned handle and are dropped with it.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_session(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(target: "session", %id, "Session removed");
        }
        removed
    }

    /// Drop sessions idle for at least `ttl` that nobody is watching.
    /// Returns how many were removed.
    pub async fn reap_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, handle| {
            let keep = handle.has_watchers() || handle.idle_for() < ttl;
            if !keep {
                debug!(target: "session", %id, idle = ?handle.idle_for(), "Reaping idle session");
            }
            keep
        });
        before - sessions.len()
    }

    /// Periodic idle sweep. The task holds only a weak reference and ends
    /// once the state is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let ttl = Duration::from_secs(self.session_settings.idle_ttl_secs);
        let every = Duration::from_secs(self.session_settings.sweep_interval_secs.max(1));
        spawn_sweep(Arc::downgrade(self), ttl, every)
    }
}

fn spawn_sweep(state: Weak<AppState>, ttl: Duration, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let Some(state) = state.upgrade() else { break };
            let removed = state.reap_idle(ttl).await;
            if removed > 0 {
                let remaining = state.sessions.read().await.len();
                info!(target: "session", removed, remaining, "Idle sessions reaped");
            }
        }
    })
}
