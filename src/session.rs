//! Per-chat translation requests and the state machine that drives them.
//!
//! Every chat holds at most one [`Session`]. Sessions that have not been
//! touched for longer than the store's TTL are treated as absent and get
//! dropped by [`SessionStore::purge_expired`]. A session whose translation is
//! still running never expires.

use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use teloxide::types::ChatId;
use tokio::{sync::Mutex, time::Instant};

use crate::language::Language;

/// Identifies one request; buttons carry it so a press on an older prompt
/// cannot act on a newer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Good,
    Bad,
    Comment,
}

impl Feedback {
    pub fn as_str(self) -> &'static str {
        match self {
            Feedback::Good => "good",
            Feedback::Bad => "bad",
            Feedback::Comment => "comment",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "good" => Some(Feedback::Good),
            "bad" => Some(Feedback::Bad),
            "comment" => Some(Feedback::Comment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingTranslation {
    pub id: RequestId,
    pub user_text: String,
    pub detected_language: Language,
    pub target_language: Option<Language>,
    pub translated_text: Option<String>,
    pub feedback: Option<Feedback>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingTarget,
    Translating,
    AwaitingFeedback,
    AwaitingComment,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub request: PendingTranslation,
    pub stage: Stage,
    touched_at: Instant,
}

/// Everything the engine needs for one translation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub chat_id: ChatId,
    pub id: RequestId,
    pub user_text: String,
    pub source: Language,
    pub target: Language,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Start(Job),
    /// A translation for this request is already running.
    Busy,
    /// No live request accepts a target language.
    Expired,
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<ChatId, Session>>,
    ttl: Duration,
    next_id: AtomicU64,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            next_id: AtomicU64::new(1),
        }
    }

    /// Starts a fresh request, replacing whatever the chat had before.
    pub async fn begin(&self, chat_id: ChatId, user_text: String, detected: Language) -> RequestId {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Session {
            request: PendingTranslation {
                id,
                user_text,
                detected_language: detected,
                target_language: None,
                translated_text: None,
                feedback: None,
                comment: None,
            },
            stage: Stage::AwaitingTarget,
            touched_at: Instant::now(),
        };
        self.sessions.lock().await.insert(chat_id, session);
        id
    }

    /// `id` is the request the pressed button belongs to.
    pub async fn select_target(&self, chat_id: ChatId, id: RequestId, target: Language) -> Selection {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = self.live(&mut sessions, chat_id) else {
            return Selection::Expired;
        };
        if session.request.id != id {
            return Selection::Expired;
        }
        match session.stage {
            Stage::AwaitingTarget | Stage::AwaitingFeedback => {
                session.stage = Stage::Translating;
                session.touched_at = Instant::now();
                let request = &mut session.request;
                request.target_language = Some(target);
                request.translated_text = None;
                request.feedback = None;
                Selection::Start(Job {
                    chat_id,
                    id: request.id,
                    user_text: request.user_text.clone(),
                    source: request.detected_language,
                    target,
                })
            }
            Stage::Translating => Selection::Busy,
            Stage::AwaitingComment | Stage::Closed => Selection::Expired,
        }
    }

    /// Stores a successful translation. Returns `false` when the request was
    /// replaced or expired in the meantime.
    pub async fn complete(&self, job: &Job, translated: &str) -> bool {
        self.finish(job, |session| {
            session.stage = Stage::AwaitingFeedback;
            session.request.translated_text = Some(translated.to_string());
        })
        .await
    }

    /// Puts the request back to awaiting a target so the user can retry.
    pub async fn fail(&self, job: &Job) -> bool {
        self.finish(job, |session| {
            session.stage = Stage::AwaitingTarget;
            session.request.target_language = None;
        })
        .await
    }

    async fn finish<F>(&self, job: &Job, apply: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.lock().await;
        match self.live(&mut sessions, job.chat_id) {
            Some(session) if session.request.id == job.id && session.stage == Stage::Translating => {
                apply(session);
                session.touched_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Good and bad close the request, a comment request waits for text.
    pub async fn record_feedback(
        &self,
        chat_id: ChatId,
        id: RequestId,
        feedback: Feedback,
    ) -> Option<PendingTranslation> {
        let mut sessions = self.sessions.lock().await;
        let session = self.live(&mut sessions, chat_id)?;
        if session.request.id != id || session.stage != Stage::AwaitingFeedback {
            return None;
        }
        session.stage = match feedback {
            Feedback::Good | Feedback::Bad => Stage::Closed,
            Feedback::Comment => Stage::AwaitingComment,
        };
        session.touched_at = Instant::now();
        session.request.feedback = Some(feedback);
        Some(session.request.clone())
    }

    /// Takes `text` as the comment if, and only if, the chat is waiting for
    /// one. Otherwise the text belongs to a new request.
    pub async fn capture_comment(&self, chat_id: ChatId, text: &str) -> Option<PendingTranslation> {
        let mut sessions = self.sessions.lock().await;
        let session = self.live(&mut sessions, chat_id)?;
        if session.stage != Stage::AwaitingComment {
            return None;
        }
        session.stage = Stage::Closed;
        session.touched_at = Instant::now();
        session.request.comment = Some(text.to_string());
        Some(session.request.clone())
    }

    #[cfg(test)]
    pub async fn get(&self, chat_id: ChatId) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        self.live(&mut sessions, chat_id).cloned()
    }

    /// Drops every expired session and returns how many went away.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn live<'a>(
        &self,
        sessions: &'a mut HashMap<ChatId, Session>,
        chat_id: ChatId,
    ) -> Option<&'a mut Session> {
        let now = Instant::now();
        if sessions
            .get(&chat_id)
            .is_some_and(|session| self.is_expired(session, now))
        {
            sessions.remove(&chat_id);
        }
        sessions.get_mut(&chat_id)
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        session.stage != Stage::Translating
            && now.saturating_duration_since(session.touched_at) >= self.ttl
    }
}
