//! In-memory collaborators for unit tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::feed::{FeedFetcher, FeedSnapshot, FetchError, Item};
use crate::sink::{OutputSink, SinkError, ERROR_BUFFER};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

pub fn item(title: &str, published: Option<i64>, updated: Option<i64>) -> Item {
    Item {
        title: title.to_string(),
        link: Some(format!("https://example.com/{title}")),
        published: published.map(at),
        updated: updated.map(at),
    }
}

#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(String, String)>>,
    diagnostics: Mutex<Vec<String>>,
    closed: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
    fail_diagnostics: AtomicBool,
}

impl MemorySink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail_writes.store(true, Ordering::SeqCst);
        sink
    }

    /// Items go through, every diagnostic write fails.
    pub fn failing_diagnostics() -> Self {
        let sink = Self::default();
        sink.fail_diagnostics.store(true, Ordering::SeqCst);
        sink
    }

    /// Lines written to any buffer, without the buffer name.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn buffers(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(buffer, _)| buffer.clone())
            .collect()
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

impl OutputSink for MemorySink {
    fn write_line(&self, buffer: &str, line: &str) -> Result<(), SinkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SinkError::Io {
                buffer: buffer.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink gone"),
            });
        }
        self.lines
            .lock()
            .unwrap()
            .push((buffer.to_string(), line.to_string()));
        Ok(())
    }

    fn diagnostic(&self, line: &str) -> Result<(), SinkError> {
        if self.fail_diagnostics.load(Ordering::SeqCst) {
            return Err(SinkError::Io {
                buffer: ERROR_BUFFER.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::IsADirectory, "errors is a directory"),
            });
        }
        self.diagnostics.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn close_buffer(&self, name: &str) -> Result<(), SinkError> {
        self.closed.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Polls `condition` every 10 ms, panicking after 5 s.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// What [`ScriptedFetcher`] answers for one URL.
#[derive(Clone)]
pub enum Scripted {
    Feed { title: String, items: Vec<Item> },
    Status(u16),
    /// Never answers; only returns once cancelled.
    Hang,
}

#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    call_times: Mutex<Vec<Instant>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_feed(&self, url: &str, title: &str, items: Vec<Item>) {
        self.set(
            url,
            Scripted::Feed {
                title: title.to_string(),
                items,
            },
        );
    }

    pub fn set(&self, url: &str, response: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// When each fetch started, on tokio's (possibly paused) clock.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

impl FeedFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FeedSnapshot, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.call_times.lock().unwrap().push(Instant::now());
        let response = self.responses.lock().unwrap().get(url).cloned();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            Some(Scripted::Feed { title, items }) => Ok(FeedSnapshot::new(url, title, items)),
            Some(Scripted::Status(code)) => Err(FetchError::HttpStatus(code)),
            Some(Scripted::Hang) => {
                cancel.cancelled().await;
                Err(FetchError::Cancelled)
            }
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}
