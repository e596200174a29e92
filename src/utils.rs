use color_eyre::eyre::WrapErr;
use tokio::{
    io,
    io::{AsyncRead, AsyncWrite},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs logging and error reporting. `RUST_LOG` overrides the default
/// `info` level.
pub fn pre_flight() -> color_eyre::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(console_subscriber::spawn())
        .with(tracing_error::ErrorLayer::default())
        .init();
    color_eyre::install()?;

    Ok(())
}

/// Reads `input` to the end into `output`. `stream` names the pipe in the
/// error report.
pub async fn drain<I, O>(mut input: I, mut output: O, stream: &str) -> color_eyre::Result<u64>
where
    I: AsyncRead + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
{
    let bytes = io::copy(&mut input, &mut output)
        .await
        .wrap_err_with(|| format!("failed to read runner {stream}"))?;
    Ok(bytes)
}
