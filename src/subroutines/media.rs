//! Media attachments
//!
//! Media is sent as its own message. The handlers start delivery in the
//! background and suppress the text reply; delivery failures are only logged.

use super::{CallContext, SubroutineError, SubroutineKind, SubroutineOutput, SubroutineRegistry};
use crate::fetch::{FetchError, MediaAsset, MediaSource};
use crate::random::RandomSource;
use crate::transport::{Outbound, Transport};
use std::path::PathBuf;
use std::sync::Arc;

/// Search results considered when picking an asset
const SEARCH_CANDIDATES: usize = 5;

impl SubroutineRegistry {
    pub(super) fn fetch_media(
        &self,
        args: &[String],
        context: &CallContext,
    ) -> Result<SubroutineOutput, SubroutineError> {
        if args.is_empty() {
            return Err(SubroutineError::invalid(
                SubroutineKind::FetchMedia,
                "at least one keyword is required",
            ));
        }
        let query = args.join("+");
        let media = Arc::clone(&self.media);
        let random = Arc::clone(&self.random);

        self.deliver(SubroutineKind::FetchMedia, context, async move {
            tracing::debug!(query = %query, "Searching media");
            let results = media.search(&query).await?;
            let asset = pick_result(results, random.as_ref())
                .ok_or_else(|| FetchError::decode(format!("No media found for `{query}`")))?;
            let data = media.download(&asset).await?;
            Ok((asset.file_name, data))
        });
        Ok(SubroutineOutput::Suppressed)
    }

    pub(super) fn fetch_random_media(&self, context: &CallContext) -> SubroutineOutput {
        let media = Arc::clone(&self.media);
        self.deliver(SubroutineKind::FetchRandomMedia, context, async move {
            let asset = media.random().await?;
            let data = media.download(&asset).await?;
            Ok((asset.file_name, data))
        });
        SubroutineOutput::Suppressed
    }

    /// Send `<media_dir>/<tags joined by _>.gif`
    pub(super) fn fetch_local_media(
        &self,
        args: &[String],
        context: &CallContext,
    ) -> Result<SubroutineOutput, SubroutineError> {
        let path = local_media_path(&self.media_dir, args)?;
        self.deliver(SubroutineKind::FetchLocalMedia, context, async move {
            let data = tokio::fs::read(&path).await.map_err(|e| {
                FetchError::not_configured(format!("Failed to read {}: {e}", path.display()))
            })?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok((file_name, data))
        });
        Ok(SubroutineOutput::Suppressed)
    }

    /// Fetch in the background, then send the result as an attachment
    fn deliver<F>(&self, kind: SubroutineKind, context: &CallContext, fetch: F)
    where
        F: std::future::Future<Output = Result<(String, Vec<u8>), FetchError>> + Send + 'static,
    {
        let transport: Arc<dyn Transport> = Arc::clone(&self.transport);
        let thread_id = context.thread_id().to_string();

        tokio::spawn(async move {
            let (file_name, data) = match fetch.await {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::warn!(
                        thread_id = %thread_id,
                        subroutine = %kind,
                        error = %e,
                        error_kind = ?e.kind,
                        "Media fetch failed"
                    );
                    return;
                }
            };

            let size = data.len();
            if let Err(e) = transport
                .send_message(&thread_id, Outbound::Attachment { file_name, data })
                .await
            {
                tracing::warn!(thread_id = %thread_id, subroutine = %kind, error = %e, "Failed to send media");
            } else {
                tracing::info!(thread_id = %thread_id, subroutine = %kind, bytes = size, "Media sent");
            }
        });
    }
}

/// Uniform pick among the first few results
fn pick_result(results: Vec<MediaAsset>, random: &dyn RandomSource) -> Option<MediaAsset> {
    let candidates = results.len().min(SEARCH_CANDIDATES);
    if candidates == 0 {
        return None;
    }
    results.into_iter().nth(random.below(candidates))
}

fn local_media_path(media_dir: &std::path::Path, tags: &[String]) -> Result<PathBuf, SubroutineError> {
    if tags.is_empty() {
        return Err(SubroutineError::invalid(
            SubroutineKind::FetchLocalMedia,
            "a media name is required",
        ));
    }
    let valid = |tag: &String| {
        !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    if let Some(bad) = tags.iter().find(|tag| !valid(tag)) {
        return Err(SubroutineError::invalid(
            SubroutineKind::FetchLocalMedia,
            format!("unsupported characters in `{bad}`"),
        ));
    }
    Ok(media_dir.join(format!("{}.gif", tags.join("_"))))
}
