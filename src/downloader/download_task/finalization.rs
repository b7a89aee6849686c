//! Download finalization: record the artifact and write the description sidecar.

use std::path::Path;

use crate::types::VideoRecord;

use super::context::TaskContext;

/// Record a finished artifact in the duplicate index and write the optional sidecar.
///
/// Sidecar failures are logged and never fail the download.
pub(super) async fn finish_download(
    ctx: &TaskContext,
    record: &VideoRecord,
    stem: &str,
    path: &Path,
    bytes: u64,
) {
    ctx.services
        .duplicates
        .mark_downloaded(record.id.as_deref(), &record.title)
        .await;

    tracing::info!(
        task_id = ctx.id.0,
        video_id = record.id.as_deref().unwrap_or_default(),
        path = %path.display(),
        bytes,
        "Download complete"
    );

    if !ctx.config.download.save_description {
        return;
    }
    let Some(text) = render_description(record) else {
        return;
    };

    let sidecar = ctx
        .config
        .download_dir()
        .join(format!("{stem}_description.txt"));
    if let Err(e) = tokio::fs::write(&sidecar, text).await {
        tracing::warn!(path = %sidecar.display(), error = %e, "Could not save description");
    }
}

/// Render the description sidecar, or `None` when the video has no description
pub(crate) fn render_description(record: &VideoRecord) -> Option<String> {
    let description = record.description.as_deref().filter(|d| !d.is_empty())?;
    let unknown = || "Unknown".to_string();
    let rule = "=".repeat(60);

    let duration = record
        .duration
        .map(|secs| format_duration(secs as u64))
        .unwrap_or_else(unknown);

    Some(format!(
        "Title: {title}\n\
         URL: {url}\n\
         Uploader: {uploader}\n\
         Duration: {duration}\n\
         View Count: {views}\n\
         Upload Date: {date}\n\
         Tags: {tags}\n\
         \n{rule}\n\
         DESCRIPTION:\n\
         {rule}\n\n\
         {description}",
        title = record.title,
        url = record.url,
        uploader = record.uploader.clone().unwrap_or_else(unknown),
        views = record
            .view_count
            .map(|v| v.to_string())
            .unwrap_or_else(unknown),
        date = record.upload_date.clone().unwrap_or_else(unknown),
        tags = record.tags.join(", "),
    ))
}

/// `H:MM:SS` or `M:SS`
fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
