use std::fmt;

use tracing::debug;

/// Languages the translation model accepts, both as source and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    Spanish,
    French,
    German,
    Persian,
    Russian,
}

impl Language {
    /// Keyboard order: two buttons per row.
    pub const ALL: [Language; 6] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Persian,
        Language::Russian,
    ];

    pub const DEFAULT: Language = Language::English;

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "eng",
            Language::Spanish => "spa",
            Language::French => "fra",
            Language::German => "deu",
            Language::Persian => "pes",
            Language::Russian => "rus",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Persian => "Persian",
            Language::Russian => "Russian",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Best-guess language identification for raw text.
pub trait Classifier: Send + Sync {
    /// Returns an ISO 639-3 code and a confidence, or `None` when nothing
    /// could be detected.
    fn classify(&self, text: &str) -> Option<(String, f64)>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangClassifier;

impl Classifier for WhatlangClassifier {
    fn classify(&self, text: &str) -> Option<(String, f64)> {
        let info = whatlang::detect(text)?;
        Some((info.lang().code().to_owned(), info.confidence()))
    }
}

/// Maps whatever the classifier said onto the supported set.
///
/// `fas` is the macrolanguage code some classifiers use for Persian; the
/// model only knows `pes`. Everything unsupported falls back to English.
pub fn normalize(code: Option<&str>) -> Language {
    let code = match code {
        Some("fas") => "pes",
        Some(code) => code,
        None => return Language::DEFAULT,
    };
    Language::from_code(code).unwrap_or(Language::DEFAULT)
}

pub fn detect_language(classifier: &dyn Classifier, text: &str) -> Language {
    let classified = classifier.classify(text);
    let language = normalize(classified.as_ref().map(|(code, _)| code.as_str()));
    debug!(?classified, %language, "classified text");
    language
}
