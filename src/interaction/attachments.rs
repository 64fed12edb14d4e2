//! Concurrent fetch of message attachments.

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::{
    base::{sniff::detect_content_type, types::Blob},
    service::chat::ChatClient,
};

/// Download every URL concurrently and wait for all of them to finish.
///
/// Failed downloads are logged and contribute nothing, so the result may be
/// shorter than `urls`. Empty URLs are skipped without a request.
#[instrument(skip_all, fields(count = urls.len()))]
pub async fn fetch_blobs(chat: &ChatClient, urls: &[String]) -> Vec<Blob> {
    if urls.is_empty() {
        return Vec::new();
    }

    let fetches = urls.iter().filter(|url| !url.is_empty()).map(|url| async move {
        match chat.download_file(url).await {
            Ok(data) => {
                let mime_type = detect_content_type(&data).to_string();
                debug!("Fetched {} bytes of `{}` from {}", data.len(), mime_type, url);

                Some(Blob { mime_type, data })
            }
            Err(err) => {
                warn!("Failed to fetch file data from {}: {}", url, err);
                None
            }
        }
    });

    join_all(fetches).await.into_iter().flatten().collect()
}

// Tests.

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, Instant},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        base::types::{Res, ThreadMessage, Void},
        service::chat::GenericChatClient,
    };

    /// Chat double whose downloads take `delay` and fail for URLs containing `missing`.
    struct SlowFiles {
        delay: Duration,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl GenericChatClient for SlowFiles {
        async fn bot_user_id(&self) -> Res<String> {
            Ok("UBOT".to_string())
        }

        async fn get_thread_replies(&self, _channel_id: &str, _thread_ts: &str) -> Res<Vec<ThreadMessage>> {
            Ok(Vec::new())
        }

        async fn post_message(&self, _channel_id: &str, _thread_ts: &str, _text: &str) -> Void {
            Ok(())
        }

        async fn upload_file(&self, _channel_id: &str, _thread_ts: &str, _file_name: &str, _blob: &Blob, _initial_comment: &str) -> Void {
            Ok(())
        }

        async fn download_file(&self, url: &str) -> Res<Vec<u8>> {
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);

            if url.contains("missing") {
                return Err(anyhow::anyhow!("404 Not Found"));
            }

            Ok(b"%PDF-1.4 body".to_vec())
        }
    }

    fn slow_chat(delay: Duration) -> (ChatClient, Arc<SlowFiles>) {
        let files = Arc::new(SlowFiles {
            delay,
            finished: AtomicUsize::new(0),
        });

        (ChatClient::new(files.clone()), files)
    }

    #[tokio::test]
    async fn test_failed_fetch_is_dropped_after_all_resolve() {
        let (chat, files) = slow_chat(Duration::from_millis(200));
        let urls = vec!["https://files/a.pdf".to_string(), "https://files/missing.pdf".to_string(), "https://files/c.pdf".to_string()];

        let started = Instant::now();
        let blobs = fetch_blobs(&chat, &urls).await;
        let elapsed = started.elapsed();

        assert_eq!(blobs.len(), 2);
        assert!(blobs.iter().all(|b| b.mime_type == "application/pdf"));
        assert_eq!(files.finished.load(Ordering::SeqCst), 3);

        // Concurrent: roughly one delay, not three.
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(550), "fetches ran sequentially: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_no_urls_yields_nothing_immediately() {
        let (chat, files) = slow_chat(Duration::from_secs(10));

        let blobs = fetch_blobs(&chat, &[]).await;

        assert!(blobs.is_empty());
        assert_eq!(files.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_url_is_skipped() {
        let (chat, files) = slow_chat(Duration::from_millis(1));

        let blobs = fetch_blobs(&chat, &[String::new(), "https://files/a.pdf".to_string()]).await;

        assert_eq!(blobs.len(), 1);
        assert_eq!(files.finished.load(Ordering::SeqCst), 1);
    }
}
