//! Mock renderer for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use data_model_kit::test_helpers::not_found;
use data_model_kit::{RenderRequest, RenderResponse};

use crate::render::{AssetReader, Renderer};

/// Mock renderer that serves canned responses per path and records what it was asked.
///
/// Paths without a canned response render as a 404.
#[derive(Debug, Default)]
pub struct MockRenderer {
    responses: HashMap<String, RenderResponse>,
    failures: HashMap<String, String>,
    reads: HashMap<String, String>,
    delay: Option<Duration>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<RenderRequest>>,
    read_results: Mutex<Vec<(String, Option<Vec<u8>>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock renderer with a response for `path`.
    pub fn with_response(mut self, path: impl Into<String>, response: RenderResponse) -> Self {
        self.add_response(path, response);
        self
    }

    /// Adds a response for `path`.
    pub fn add_response(&mut self, path: impl Into<String>, response: RenderResponse) {
        self.responses.insert(path.into(), response);
    }

    /// Rendering `path` fails with `message`.
    pub fn with_failure(mut self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(path.into(), message.into());
        self
    }

    /// Every render waits for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Rendering `path` waits for `delay`, overriding [`MockRenderer::with_delay`].
    pub fn with_delay_for(mut self, path: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(path.into(), delay);
        self
    }

    /// While rendering `path`, read back `asset` through the run's asset reader.
    pub fn with_read(mut self, path: impl Into<String>, asset: impl Into<String>) -> Self {
        self.reads.insert(path.into(), asset.into());
        self
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<RenderRequest> {
        lock(&self.requests).clone()
    }

    pub fn requested_paths(&self) -> Vec<String> {
        lock(&self.requests).iter().map(|request| request.path.clone()).collect()
    }

    pub fn render_count(&self, path: &str) -> usize {
        lock(&self.requests).iter().filter(|request| request.path == path).count()
    }

    /// The most renders that were ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// What each configured read returned, in order.
    pub fn read_results(&self) -> Vec<(String, Option<Vec<u8>>)> {
        lock(&self.read_results).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, request: RenderRequest, assets: &dyn AssetReader) -> anyhow::Result<RenderResponse> {
        lock(&self.requests).push(request.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&request.path).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        if let Some(asset) = self.reads.get(&request.path) {
            let contents = assets.read(asset).await;
            lock(&self.read_results).push((asset.clone(), contents));
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = self.failures.get(&request.path) {
            anyhow::bail!("{message}");
        }
        Ok(self.responses.get(&request.path).cloned().unwrap_or_else(not_found))
    }
}
