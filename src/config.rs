use std::{env::var, time::Duration};

use camino::Utf8PathBuf;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result, Section,
};

use crate::translate::Device;

const DEFAULT_TRANSLATOR_COMMAND: &str = "m4t-translate";
const DEFAULT_MODEL: &str = "facebook/hf-seamless-m4t-medium";
const DEFAULT_TRANSLATOR_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SESSION_TTL_SECS: u64 = 900;

#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorConfig {
    pub program: Utf8PathBuf,
    /// Leading arguments, placed before the model and language flags.
    pub args: Vec<String>,
    pub model: String,
    pub device: Device,
    pub timeout: Option<Duration>,
}

#[derive(Clone, PartialEq)]
pub struct Config {
    pub bot_token: String,
    pub translator: TranslatorConfig,
    pub session_ttl: Duration,
}

// Keeps the token out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<redacted>")
            .field("translator", &self.translator)
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("TELOXIDE_TOKEN"))
            .ok_or_else(|| {
                eyre!("TELEGRAM_BOT_TOKEN is not set")
                    .suggestion("export the token handed out by @BotFather as TELEGRAM_BOT_TOKEN")
            })?;

        let command = get("TRANSLATOR_COMMAND").unwrap_or_else(|| DEFAULT_TRANSLATOR_COMMAND.to_string());
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .map(Utf8PathBuf::from)
            .ok_or_else(|| eyre!("TRANSLATOR_COMMAND is empty"))?;
        let args = words.collect();

        let device = match get("TRANSLATOR_DEVICE") {
            Some(device) => device.parse().wrap_err("TRANSLATOR_DEVICE is invalid")?,
            None => Device::Auto,
        };

        let timeout = seconds(&get, "TRANSLATOR_TIMEOUT_SECS", DEFAULT_TRANSLATOR_TIMEOUT_SECS)?;
        let session_ttl = seconds(&get, "SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?;
        if session_ttl.is_zero() {
            return Err(eyre!("SESSION_TTL_SECS must be greater than zero")
                .suggestion("leave it unset for the default of 900 seconds"));
        }

        Ok(Self {
            bot_token,
            translator: TranslatorConfig {
                program,
                args,
                model: get("TRANSLATOR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                device,
                timeout: (!timeout.is_zero()).then_some(timeout),
            },
            session_ttl,
        })
    }
}

fn seconds(get: &dyn Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs = match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .wrap_err_with(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}
