use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use color_eyre::eyre::{eyre, OptionExt, WrapErr};
use tokio::{io::AsyncWriteExt, process::Command, time};
use tracing::{info, instrument};

use super::{process::ensure_exit_ok, Device, TranslationEngine};
use crate::{config::TranslatorConfig, language::Language, utils::drain};

/// Runs an external model runner once per translation.
///
/// The runner gets the model, device and languages as flags, reads the text
/// on stdin and prints the translation on stdout.
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    program: Utf8PathBuf,
    args: Vec<String>,
    model: String,
    device: Device,
    timeout: Option<Duration>,
}

impl SubprocessEngine {
    pub fn new(config: &TranslatorConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            model: config.model.clone(),
            device: config.device.resolve(),
            timeout: config.timeout,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    fn command(&self, source: Language, target: Language) -> Command {
        let mut command = Command::new(self.program.as_std_path());
        command
            .args(&self.args)
            .args(["--model", self.model.as_str()])
            .arg("--device")
            .arg(self.device.to_string())
            .args(["--src-lang", source.code(), "--tgt-lang", target.code()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, text: &str, source: Language, target: Language) -> color_eyre::Result<String> {
        let mut child = self
            .command(source, target)
            .spawn()
            .wrap_err_with(|| format!("failed to spawn {}", self.program))?;
        let mut stdin = child.stdin.take().ok_or_eyre("runner stdin was not captured")?;
        let stdout = child.stdout.take().ok_or_eyre("runner stdout was not captured")?;
        let stderr = child.stderr.take().ok_or_eyre("runner stderr was not captured")?;

        let input = text.as_bytes().to_vec();
        let input_handle = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });
        let mut buffer = Vec::new();
        let mut diagnostics = Vec::new();
        let output_handle = drain(stdout, &mut buffer, "stdout");
        // runners log progress bars here; a full pipe would stall them
        let diagnostics_handle = drain(stderr, &mut diagnostics, "stderr");

        info!("starting translation runner");
        let (input, output, logged) = tokio::join!(input_handle, output_handle, diagnostics_handle);
        logged?;

        // exit status first: a runner that dies early also breaks the pipe
        ensure_exit_ok(&mut child, &diagnostics, self.program.as_str())
            .await
            .wrap_err("translation runner did not work")?;
        input?.wrap_err("failed to pipe text into the runner")?;
        let written = output?;
        info!(?written, "runner finished");

        let translated = String::from_utf8_lossy(&buffer).trim().to_string();
        if translated.is_empty() {
            return Err(eyre!("translation runner produced no output"));
        }
        Ok(translated)
    }
}

#[async_trait]
impl TranslationEngine for SubprocessEngine {
    #[instrument(skip(self, text), fields(program = %self.program, device = %self.device), err)]
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> color_eyre::Result<String> {
        match self.timeout {
            Some(limit) => time::timeout(limit, self.run(text, source, target))
                .await
                .map_err(|_| eyre!("translation runner timed out after {limit:?}"))?,
            None => self.run(text, source, target).await,
        }
    }
}
