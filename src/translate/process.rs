use color_eyre::{eyre::eyre, Report, Section, SectionExt};
use tokio::process::Child;

/// Waits for `child` and turns a failed exit into a report. The last stderr
/// line goes into the message, the full stderr into a section.
pub async fn ensure_exit_ok(
    child: &mut Child,
    stderr: &[u8],
    program: &str,
) -> color_eyre::Result<(), Report> {
    let status = child.wait().await?;

    if status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(stderr).trim_end().to_string();
    let last_line = stderr.lines().last().unwrap_or("no stderr output").to_string();
    let exit_code = format!("{:?}", status.code()).header("status code:");

    Err(eyre!("{program} exited unsuccessfully: {last_line}")
        .section(exit_code)
        .section(stderr.header("stderr:")))
}
