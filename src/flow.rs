use std::{sync::Arc, time::Duration};

use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{error, info, instrument, warn};

use crate::{
    language::{detect_language, Classifier, Language},
    session::{Feedback, Job, RequestId, Selection, SessionStore},
    translate::TranslationEngine,
};

pub const GREETING: &str = "Hello! Send me a message and I will translate it.";
pub const APOLOGY: &str = "Sorry, something went wrong during the translation. Please try again.";
pub const EXPIRED: &str = "This translation request has expired. Please send the text again.";
pub const BUSY: &str = "Still translating, please wait.";
pub const COMMENT_PROMPT: &str = "Please send your comments about the translation:";
pub const COMMENT_THANKS: &str = "Thank you for your comment!";
const GOOD_THANKS: &str = "Thank you for your feedback! We're glad you liked the translation.";
const BAD_THANKS: &str =
    "Sorry to hear that the translation wasn't up to your expectations. We'll work to improve!";

const LANGUAGE_PREFIX: &str = "lang_";
const FEEDBACK_PREFIX: &str = "feedback_";

/// What a button press asks for, decoded from its callback data.
///
/// Data looks like `lang_<code>_<request>` or `feedback_<kind>_<request>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    SelectTarget(RequestId, Language),
    Feedback(RequestId, Feedback),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let split = |rest: &str| {
            let (value, id) = rest.rsplit_once('_')?;
            Some((value.to_owned(), RequestId::new(id.parse().ok()?)))
        };
        if let Some(rest) = data.strip_prefix(LANGUAGE_PREFIX) {
            let (code, id) = split(rest)?;
            return Language::from_code(&code).map(|lang| CallbackAction::SelectTarget(id, lang));
        }
        let (kind, id) = split(data.strip_prefix(FEEDBACK_PREFIX)?)?;
        Feedback::from_kind(&kind).map(|kind| CallbackAction::Feedback(id, kind))
    }

    pub fn data(self) -> String {
        match self {
            CallbackAction::SelectTarget(id, lang) => {
                format!("{LANGUAGE_PREFIX}{}_{}", lang.code(), id.get())
            }
            CallbackAction::Feedback(id, kind) => {
                format!("{FEEDBACK_PREFIX}{}_{}", kind.as_str(), id.get())
            }
        }
    }
}

/// A message to send, or to put in place of the message whose button was
/// pressed.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub markup: Option<InlineKeyboardMarkup>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
        }
    }

    fn with_markup(mut self, markup: InlineKeyboardMarkup) -> Self {
        self.markup = Some(markup);
        self
    }
}

/// Outcome of a target-language button press.
#[derive(Debug)]
pub enum TargetChoice {
    /// Acknowledge, then run [`SessionHandler::translate`] with the job.
    Translate(Job),
    /// Acknowledge with this notice and leave the message alone.
    Notice(&'static str),
    /// Acknowledge and replace the message.
    Replace(Reply),
}

pub fn language_keyboard(id: RequestId) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = Language::ALL
        .into_iter()
        .map(|lang| {
            InlineKeyboardButton::callback(lang.name(), CallbackAction::SelectTarget(id, lang).data())
        })
        .collect();
    InlineKeyboardMarkup::new(buttons.chunks(2).map(<[_]>::to_vec))
}

pub fn feedback_keyboard(id: RequestId) -> InlineKeyboardMarkup {
    let button = |label: &str, kind| {
        InlineKeyboardButton::callback(label, CallbackAction::Feedback(id, kind).data())
    };
    InlineKeyboardMarkup::new([
        vec![button("Good", Feedback::Good), button("Bad", Feedback::Bad)],
        vec![button("Add Comment", Feedback::Comment)],
    ])
}

/// Drives one chat through detect → choose target → translate → feedback.
pub struct SessionHandler {
    sessions: SessionStore,
    classifier: Box<dyn Classifier>,
    engine: Arc<dyn TranslationEngine>,
}

impl SessionHandler {
    pub fn new(
        classifier: Box<dyn Classifier>,
        engine: Arc<dyn TranslationEngine>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions: SessionStore::new(session_ttl),
            classifier,
            engine,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn start(&self) -> Reply {
        Reply::text(GREETING)
    }

    /// Plain text is a comment when one was asked for, otherwise it starts
    /// a new request.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn on_text(&self, chat_id: ChatId, text: &str) -> Reply {
        if let Some(request) = self.sessions.capture_comment(chat_id, text).await {
            info!(
                request = %request.id,
                source = %request.detected_language,
                target = ?request.target_language,
                translated = ?request.translated_text,
                feedback = ?request.feedback,
                comment = ?request.comment,
                "received comment"
            );
            return Reply::text(COMMENT_THANKS);
        }

        let detected = detect_language(self.classifier.as_ref(), text);
        let id = self.sessions.begin(chat_id, text.to_string(), detected).await;
        info!(request = %id, %detected, "awaiting target language");

        Reply::text(format!(
            "Detected language: {}. Please choose the target language:",
            detected.name()
        ))
        .with_markup(language_keyboard(id))
    }

    pub async fn choose_target(&self, chat_id: ChatId, id: RequestId, target: Language) -> TargetChoice {
        match self.sessions.select_target(chat_id, id, target).await {
            Selection::Start(job) => TargetChoice::Translate(job),
            Selection::Busy => TargetChoice::Notice(BUSY),
            Selection::Expired => {
                warn!(%chat_id, request = %id, "target chosen without a live request");
                TargetChoice::Replace(Reply::text(EXPIRED))
            }
        }
    }

    /// Runs the engine for `job`. Never fails: engine errors turn into the
    /// apology reply.
    #[instrument(skip_all, fields(chat_id = %job.chat_id, source = %job.source, target = %job.target))]
    pub async fn translate(&self, job: Job) -> Reply {
        match self
            .engine
            .translate(&job.user_text, job.source, job.target)
            .await
        {
            Ok(translated) => {
                let current = self.sessions.complete(&job, &translated).await;
                let reply = Reply::text(format!(
                    "Translation: {translated}\n\nIs this translation good?"
                ));
                if current {
                    reply.with_markup(feedback_keyboard(job.id))
                } else {
                    info!("request was replaced while translating");
                    reply
                }
            }
            Err(err) => {
                error!(?err, "Error during translation");
                if self.sessions.fail(&job).await {
                    Reply::text(APOLOGY).with_markup(language_keyboard(job.id))
                } else {
                    Reply::text(APOLOGY)
                }
            }
        }
    }

    pub async fn feedback(&self, chat_id: ChatId, id: RequestId, kind: Feedback) -> Reply {
        let Some(request) = self.sessions.record_feedback(chat_id, id, kind).await else {
            warn!(%chat_id, request = %id, feedback = kind.as_str(), "feedback without a translated request");
            return Reply::text(EXPIRED);
        };
        info!(
            %chat_id,
            request = %request.id,
            source = %request.detected_language,
            target = ?request.target_language,
            feedback = kind.as_str(),
            "received feedback"
        );
        match kind {
            Feedback::Good => Reply::text(GOOD_THANKS),
            Feedback::Bad => Reply::text(BAD_THANKS),
            Feedback::Comment => Reply::text(COMMENT_PROMPT),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use color_eyre::eyre::eyre;
    use teloxide::types::InlineKeyboardButtonKind;

    use super::*;
    use crate::session::Stage;

    const CHAT: ChatId = ChatId(1001);

    struct FixedClassifier(&'static str);

    impl Classifier for FixedClassifier {
        fn classify(&self, _text: &str) -> Option<(String, f64)> {
            Some((self.0.to_string(), 0.9))
        }
    }

    #[derive(Default)]
    struct RecordingEngine {
        calls: Mutex<Vec<(String, Language, Language)>>,
        fail: bool,
    }

    #[async_trait]
    impl TranslationEngine for RecordingEngine {
        async fn translate(
            &self,
            text: &str,
            source: Language,
            target: Language,
        ) -> color_eyre::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), source, target));
            if self.fail {
                return Err(eyre!("CUDA out of memory"));
            }
            Ok(format!("[{target}] {text}"))
        }
    }

    fn handler(code: &'static str, engine: Arc<RecordingEngine>) -> SessionHandler {
        SessionHandler::new(
            Box::new(FixedClassifier(code)),
            engine,
            Duration::from_secs(600),
        )
    }

    fn callback_data(markup: &InlineKeyboardMarkup) -> Vec<Vec<String>> {
        markup
            .inline_keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| match &button.kind {
                        InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
                        other => panic!("unexpected button {other:?}"),
                    })
                    .collect()
            })
            .collect()
    }

    /// Sends `text` and returns the request id its language buttons carry.
    async fn prompt(handler: &SessionHandler, text: &str) -> RequestId {
        let reply = handler.on_text(CHAT, text).await;
        let markup = reply.markup.expect("language keyboard");
        match CallbackAction::parse(&callback_data(&markup)[0][0]) {
            Some(CallbackAction::SelectTarget(id, _)) => id,
            other => panic!("unexpected action {other:?}"),
        }
    }

    async fn job_for(handler: &SessionHandler, id: RequestId, target: Language) -> Job {
        match handler.choose_target(CHAT, id, target).await {
            TargetChoice::Translate(job) => job,
            other => panic!("unexpected choice {other:?}"),
        }
    }

    #[test]
    fn greeting_is_fixed() {
        let handler = handler("eng", Arc::default());
        assert_eq!(
            handler.start(),
            Reply::text("Hello! Send me a message and I will translate it.")
        );
    }

    #[test]
    fn callback_data_parses() {
        assert_eq!(
            CallbackAction::parse("lang_spa_7"),
            Some(CallbackAction::SelectTarget(RequestId::new(7), Language::Spanish))
        );
        assert_eq!(
            CallbackAction::parse("feedback_comment_12"),
            Some(CallbackAction::Feedback(RequestId::new(12), Feedback::Comment))
        );
        for junk in [
            "lang_ita_1",
            "lang_spa",
            "lang_spa_",
            "lang_spa_x",
            "spa",
            "feedback_meh_1",
            "feedback_good",
            "",
            "feedback",
        ] {
            assert_eq!(CallbackAction::parse(junk), None, "{junk}");
        }
    }

    #[test]
    fn keyboards_have_expected_layout() {
        let id = RequestId::new(3);
        assert_eq!(
            callback_data(&language_keyboard(id)),
            [
                vec!["lang_eng_3", "lang_spa_3"],
                vec!["lang_fra_3", "lang_deu_3"],
                vec!["lang_pes_3", "lang_rus_3"],
            ]
        );
        assert_eq!(
            callback_data(&feedback_keyboard(id)),
            [
                vec!["feedback_good_3", "feedback_bad_3"],
                vec!["feedback_comment_3"],
            ]
        );
    }

    #[tokio::test]
    async fn text_prompts_for_target_with_detected_name() {
        let handler = handler("fas", Arc::default());

        let reply = handler.on_text(CHAT, "سلام دنیا").await;

        assert_eq!(
            reply.text,
            "Detected language: Persian. Please choose the target language:"
        );
        let session = handler.sessions().get(CHAT).await.expect("session stored");
        assert_eq!(reply.markup, Some(language_keyboard(session.request.id)));
        assert_eq!(session.request.detected_language, Language::Persian);
        assert_eq!(session.stage, Stage::AwaitingTarget);
    }

    #[tokio::test]
    async fn unsupported_detection_defaults_to_english() {
        let handler = handler("jpn", Arc::default());

        let reply = handler.on_text(CHAT, "こんにちは").await;

        assert!(reply.text.starts_with("Detected language: English."));
    }

    #[tokio::test]
    async fn selection_invokes_engine_with_stored_request() {
        let engine = Arc::new(RecordingEngine::default());
        let handler = handler("spa", engine.clone());
        let id = prompt(&handler, "Hola").await;

        let job = job_for(&handler, id, Language::English).await;
        let reply = handler.translate(job).await;

        assert_eq!(
            *engine.calls.lock().unwrap(),
            [("Hola".to_string(), Language::Spanish, Language::English)]
        );
        assert_eq!(reply.text, "Translation: [eng] Hola\n\nIs this translation good?");
        assert_eq!(reply.markup, Some(feedback_keyboard(id)));
    }

    #[tokio::test]
    async fn older_prompt_does_not_translate_newer_text() {
        let engine = Arc::new(RecordingEngine::default());
        let handler = handler("spa", engine.clone());
        let first = prompt(&handler, "Hola").await;
        let second = prompt(&handler, "Adios").await;

        assert!(matches!(
            handler.choose_target(CHAT, first, Language::English).await,
            TargetChoice::Replace(Reply { ref text, .. }) if text == EXPIRED
        ));
        let job = job_for(&handler, second, Language::English).await;
        assert_eq!(job.user_text, "Adios");
        handler.translate(job).await;

        assert_eq!(handler.feedback(CHAT, first, Feedback::Good).await.text, EXPIRED);
        assert_eq!(engine.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn engine_failure_yields_apology() {
        let engine = Arc::new(RecordingEngine {
            fail: true,
            ..Default::default()
        });
        let handler = handler("deu", engine);
        let id = prompt(&handler, "Guten Morgen").await;

        let job = job_for(&handler, id, Language::French).await;
        let reply = handler.translate(job).await;

        assert_eq!(
            reply.text,
            "Sorry, something went wrong during the translation. Please try again."
        );
        assert_eq!(reply.markup, Some(language_keyboard(id)));
        // the user can pick again
        assert!(matches!(
            handler.choose_target(CHAT, id, Language::Russian).await,
            TargetChoice::Translate(_)
        ));
    }

    #[tokio::test]
    async fn selection_without_text_is_expired() {
        let handler = handler("eng", Arc::default());

        assert!(matches!(
            handler.choose_target(CHAT, RequestId::new(1), Language::German).await,
            TargetChoice::Replace(Reply { ref text, .. }) if text == EXPIRED
        ));
    }

    #[tokio::test]
    async fn double_press_is_busy() {
        let handler = handler("eng", Arc::default());
        let id = prompt(&handler, "Hello").await;
        job_for(&handler, id, Language::German).await;

        assert!(matches!(
            handler.choose_target(CHAT, id, Language::German).await,
            TargetChoice::Notice(BUSY)
        ));
    }

    #[tokio::test]
    async fn add_comment_captures_next_text() {
        let engine = Arc::new(RecordingEngine::default());
        let handler = handler("eng", engine.clone());
        let id = prompt(&handler, "Good morning").await;
        let job = job_for(&handler, id, Language::Spanish).await;
        handler.translate(job).await;

        let reply = handler.feedback(CHAT, id, Feedback::Comment).await;
        assert_eq!(reply.text, COMMENT_PROMPT);

        let reply = handler.on_text(CHAT, "Pretty accurate").await;
        assert_eq!(reply, Reply::text(COMMENT_THANKS));
        let session = handler.sessions().get(CHAT).await.expect("session kept");
        assert_eq!(session.request.comment.as_deref(), Some("Pretty accurate"));
        assert_eq!(session.request.user_text, "Good morning");
        assert_eq!(engine.calls.lock().unwrap().len(), 1);

        // after the comment, text starts over
        let reply = handler.on_text(CHAT, "Another one").await;
        assert!(reply.text.starts_with("Detected language:"));
    }

    #[tokio::test]
    async fn good_and_bad_feedback_are_terminal() {
        let handler = handler("eng", Arc::default());
        let id = prompt(&handler, "Hello").await;
        let job = job_for(&handler, id, Language::French).await;
        handler.translate(job).await;

        let reply = handler.feedback(CHAT, id, Feedback::Good).await;
        assert_eq!(reply.text, GOOD_THANKS);
        assert_eq!(handler.feedback(CHAT, id, Feedback::Bad).await.text, EXPIRED);
    }

    #[tokio::test]
    async fn bad_feedback_acknowledged() {
        let handler = handler("eng", Arc::default());
        let id = prompt(&handler, "Hello").await;
        let job = job_for(&handler, id, Language::Persian).await;
        handler.translate(job).await;

        assert_eq!(handler.feedback(CHAT, id, Feedback::Bad).await.text, BAD_THANKS);
    }

    #[tokio::test]
    async fn replaced_request_gets_no_feedback_buttons() {
        let handler = handler("eng", Arc::default());
        let id = prompt(&handler, "First").await;
        let job = job_for(&handler, id, Language::German).await;
        handler.on_text(CHAT, "Second").await;

        let reply = handler.translate(job).await;

        assert_eq!(reply.markup, None);
        let session = handler.sessions().get(CHAT).await.expect("newer request");
        assert_eq!(session.request.user_text, "Second");
        assert_eq!(session.stage, Stage::AwaitingTarget);
    }
}
