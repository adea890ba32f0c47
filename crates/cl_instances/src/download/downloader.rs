//! Bounded-concurrency file fetcher with aggregate progress, speed and
//! ETA reporting, HEAD probes and mirror racing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use cl_core::event::Event;
use cl_core::hash::{self, HashAlgorithm};
use cl_core::{do_jobs_with_limit, file_utils, EventBus, IntoIoError, RequestError};

use super::DownloadError;

/// How often the aggregator publishes progress/speed/ETA.
const AGGREGATE_INTERVAL: Duration = Duration::from_millis(500);
/// Moving-average window for the speed estimate.
const SPEED_SAMPLES: usize = 5;

#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
    pub size: u64,
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct HeadInfo {
    pub size: u64,
    pub status: u16,
}

#[derive(Debug, Clone)]
pub struct MirrorHit {
    pub url: String,
    pub size: u64,
    pub status: u16,
}

#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    bus: EventBus,
    max_concurrent: usize,
    download_timeout: Duration,
    cancel: CancellationToken,
}

impl Downloader {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        bus: EventBus,
        max_concurrent: usize,
        download_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            bus,
            max_concurrent: max_concurrent.max(1),
            download_timeout,
            cancel,
        }
    }

    /// Downloads a single file to `dir/name`, emitting per-chunk
    /// `progress` events.
    pub async fn download_one(
        &self,
        url: &str,
        dir: &Path,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<(), DownloadError> {
        let dest = dir.join(name);
        self.fetch(
            url,
            &dest,
            None,
            timeout.unwrap_or(self.download_timeout),
            None,
            Some(name),
        )
        .await
    }

    /// Hash-checked fetch used by the planner. Skips files already on
    /// disk with the right hash; counts skipped bytes as downloaded so
    /// aggregate progress still completes.
    pub async fn fetch_task(
        &self,
        task: &DownloadTask,
        counter: Option<&Arc<AtomicU64>>,
    ) -> Result<(), DownloadError> {
        if let Some(expected) = task.sha1.as_deref() {
            if hash::file_matches(&task.dest, expected, HashAlgorithm::Sha1).await {
                if let Some(counter) = counter {
                    counter.fetch_add(task.size, Ordering::Relaxed);
                }
                return Ok(());
            }
        } else if task.dest.is_file() {
            if let Some(counter) = counter {
                counter.fetch_add(task.size, Ordering::Relaxed);
            }
            return Ok(());
        }

        self.fetch(
            &task.url,
            &task.dest,
            task.sha1.as_deref(),
            self.download_timeout,
            counter,
            None,
        )
        .await
    }

    /// Issues up to `max_concurrent` in-flight transfers, publishing
    /// aggregate progress every ~500 ms. Individual failures surface an
    /// `error` event and count toward completion; they only abort the
    /// batch when `fail_fast` is set. Cancellation always aborts.
    pub async fn download_many(
        &self,
        tasks: Vec<DownloadTask>,
        declared_total: u64,
        fail_fast: bool,
    ) -> Result<DownloadStats, DownloadError> {
        if tasks.is_empty() {
            return Ok(DownloadStats::default());
        }

        let limit = self.max_concurrent.min(tasks.len());
        let downloaded = Arc::new(AtomicU64::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let aggregator = self.spawn_aggregator(Arc::clone(&downloaded), declared_total);

        let jobs = tasks.iter().map(|task| {
            let downloaded = Arc::clone(&downloaded);
            let completed = Arc::clone(&completed);
            let failed = Arc::clone(&failed);
            async move {
                let result = self.fetch_task(task, Some(&downloaded)).await;
                completed.fetch_add(1, Ordering::Relaxed);
                match result {
                    Ok(()) => Ok(()),
                    Err(e @ DownloadError::Aborted) => Err(e),
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        self.bus
                            .error(e.kind(), format!("download of {} failed: {e}", task.url));
                        if fail_fast {
                            Err(e)
                        } else {
                            Ok(())
                        }
                    }
                }
            }
        });

        let result = do_jobs_with_limit(jobs, limit).await;
        aggregator.abort();
        self.bus.emit(Event::Progress {
            done: downloaded.load(Ordering::Relaxed),
            total: declared_total,
            element: "download".to_owned(),
        });
        if result.is_err() {
            // Transfers dropped mid-write leave `.tmp` siblings behind;
            // sweep them so the tree stays self-healing.
            for task in &tasks {
                _ = tokio::fs::remove_file(task.dest.with_extension("tmp")).await;
            }
        }
        result?;

        Ok(DownloadStats {
            completed: completed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        })
    }

    fn spawn_aggregator(
        &self,
        downloaded: Arc<AtomicU64>,
        declared_total: u64,
    ) -> tokio::task::JoinHandle<()> {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(AGGREGATE_INTERVAL);
            let mut samples: VecDeque<(Instant, u64)> = VecDeque::new();
            loop {
                interval.tick().await;
                let bytes = downloaded.load(Ordering::Relaxed);
                samples.push_back((Instant::now(), bytes));
                if samples.len() > SPEED_SAMPLES {
                    samples.pop_front();
                }

                bus.emit(Event::Progress {
                    done: bytes,
                    total: declared_total,
                    element: "download".to_owned(),
                });

                if samples.len() >= 2 {
                    let (t0, b0) = samples.front().copied().unwrap();
                    let (t1, b1) = samples.back().copied().unwrap();
                    let dt = (t1 - t0).as_secs_f64();
                    if dt > 0.0 {
                        let speed = (b1.saturating_sub(b0)) as f64 / dt;
                        bus.emit(Event::Speed {
                            bytes_per_sec: speed,
                        });
                        if declared_total > 0 && speed > 0.0 {
                            bus.emit(Event::Estimated {
                                seconds_left: declared_total.saturating_sub(bytes) as f64 / speed,
                            });
                        }
                    }
                }
            }
        })
    }

    /// HEAD probe: `Some` with the `content-length` size iff the server
    /// answers 200. A 404 (or any request failure) is absence, not an
    /// error.
    pub async fn head_check(&self, url: &str, timeout: Option<Duration>) -> Option<HeadInfo> {
        let mut request = self.client.head(url);
        if let Some(t) = timeout {
            request = request.timeout(t);
        }
        let response = request.send().await.ok()?;
        let status = response.status();
        if !status.is_success() {
            return None;
        }
        Some(HeadInfo {
            size: response.content_length().unwrap_or(0),
            status: status.as_u16(),
        })
    }

    /// Tries mirrors in the given order; the first that HEAD-probes as
    /// 200 for `relative_path` wins.
    pub async fn mirror_probe(
        &self,
        relative_path: &str,
        mirrors: &[String],
    ) -> Option<MirrorHit> {
        for base in mirrors {
            let url = format!("{}/{relative_path}", base.trim_end_matches('/'));
            if let Some(info) = self.head_check(&url, None).await {
                return Some(MirrorHit {
                    url,
                    size: info.size,
                    status: info.status,
                });
            }
        }
        None
    }

    /// One download with wall-clock timeout, retry with backoff on
    /// transient network failures, and a single re-download on hash
    /// mismatch. Writes through a `.tmp` sibling; cancellation and
    /// timeout clean it up.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        sha1: Option<&str>,
        timeout: Duration,
        counter: Option<&Arc<AtomicU64>>,
        progress_element: Option<&str>,
    ) -> Result<(), DownloadError> {
        const NET_RETRIES: usize = 3;

        let mut hash_failures = 0usize;
        let mut net_failures = 0usize;
        let mut delay = Duration::from_millis(500);

        loop {
            let attempt = tokio::select! {
                () = self.cancel.cancelled() => Err(DownloadError::Aborted),
                res = tokio::time::timeout(
                    timeout,
                    self.stream_once(url, dest, counter, progress_element),
                ) => match res {
                    Ok(inner) => inner,
                    Err(_) => Err(DownloadError::Timeout {
                        url: url.to_owned(),
                    }),
                },
            };

            match attempt {
                Ok(()) => {
                    let Some(expected) = sha1 else {
                        return Ok(());
                    };
                    let got = hash::hash_file(dest, HashAlgorithm::Sha1).await?;
                    if got.eq_ignore_ascii_case(expected) {
                        return Ok(());
                    }
                    // A corrupt file is deleted and fetched once more;
                    // a second mismatch is fatal.
                    _ = tokio::fs::remove_file(dest).await;
                    hash_failures += 1;
                    if hash_failures > 1 {
                        return Err(DownloadError::HashMismatch {
                            url: url.to_owned(),
                            expected: expected.to_owned(),
                            got,
                        });
                    }
                }
                Err(e @ (DownloadError::Aborted | DownloadError::Timeout { .. })) => {
                    _ = tokio::fs::remove_file(dest.with_extension("tmp")).await;
                    return Err(e);
                }
                Err(e) => {
                    net_failures += 1;
                    if net_failures > NET_RETRIES {
                        return Err(e);
                    }
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(10));
                }
            }
        }
    }

    async fn stream_once(
        &self,
        url: &str,
        dest: &Path,
        counter: Option<&Arc<AtomicU64>>,
        progress_element: Option<&str>,
    ) -> Result<(), DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(RequestError::from)?;
        file_utils::check_for_success(&response)?;
        let total = response.content_length().unwrap_or(0);

        if let Some(parent) = dest.parent() {
            if !parent.is_dir() {
                tokio::fs::create_dir_all(parent).await.path(parent)?;
            }
        }

        let tmp = dest.with_extension("tmp");
        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await.path(&tmp)?;
            let mut stream = response.bytes_stream();
            let mut done = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(RequestError::from)?;
                file.write_all(&chunk).await.path(&tmp)?;
                done += chunk.len() as u64;
                if let Some(counter) = counter {
                    counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                }
                if let Some(element) = progress_element {
                    self.bus.emit(Event::Progress {
                        done,
                        total,
                        element: element.to_owned(),
                    });
                }
            }
            file.flush().await.path(&tmp)?;
            Ok::<(), DownloadError>(())
        }
        .await;

        if let Err(e) = result {
            _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp, dest).await.path(dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloader() -> Downloader {
        Downloader::new(
            reqwest::Client::new(),
            EventBus::new(),
            4,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let stats = downloader()
            .download_many(Vec::new(), 0, false)
            .await
            .unwrap();
        assert_eq!(stats, DownloadStats::default());
    }

    #[tokio::test]
    async fn cancelled_fetch_reports_aborted() {
        let cancel = CancellationToken::new();
        let d = Downloader::new(
            reqwest::Client::new(),
            EventBus::new(),
            4,
            Duration::from_secs(5),
            cancel.clone(),
        );
        cancel.cancel();

        let dest = std::env::temp_dir().join("cl_downloader_aborted.bin");
        let err = d
            .fetch(
                "http://192.0.2.1/never-reached",
                &dest,
                None,
                Duration::from_secs(5),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Aborted));
        assert!(!dest.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn already_valid_file_is_not_refetched() {
        let dir = std::env::temp_dir().join("cl_downloader_skip");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let dest = dir.join("lib.jar");
        tokio::fs::write(&dest, b"cached bytes").await.unwrap();

        let task = DownloadTask {
            // Unreachable on purpose: a fetch attempt would fail.
            url: "http://192.0.2.1/lib.jar".to_owned(),
            dest: dest.clone(),
            size: 12,
            sha1: Some(cl_core::hash::hash_bytes(
                b"cached bytes",
                HashAlgorithm::Sha1,
            )),
        };
        let counter = Arc::new(AtomicU64::new(0));
        downloader().fetch_task(&task, Some(&counter)).await.unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 12);

        _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
