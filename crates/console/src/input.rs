//! User input plumbing between the console and user proxies.
//!
//! A user proxy announces that it wants input with a
//! `UserInputRequested` event. The console renders everything before it
//! and then calls [`UserInputManager::notify_event_received`]; only then
//! is the human prompted, so the prompt never lands mid-output.

use std::collections::HashMap;
use std::sync::Arc;

use agenx_agent::InputSource;
use agenx_core::error::Error;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, Notify};

/// Holds each input request until the console has caught up with it.
pub struct UserInputManager {
    inner: Arc<dyn InputSource>,
    pending: Mutex<HashMap<String, Arc<Notify>>>,
}

impl UserInputManager {
    pub fn new(inner: Arc<dyn InputSource>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            pending: Mutex::new(HashMap::new()),
        })
    }

    async fn slot(&self, request_id: &str) -> Arc<Notify> {
        self.pending
            .lock()
            .await
            .entry(request_id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// The console reached the request event; let the reader go.
    pub async fn notify_event_received(&self, request_id: &str) {
        self.slot(request_id).await.notify_one();
    }
}

#[async_trait]
impl InputSource for UserInputManager {
    async fn read_input(&self, prompt: &str, request_id: &str) -> Result<String, Error> {
        let ready = self.slot(request_id).await;
        ready.notified().await;
        self.pending.lock().await.remove(request_id);
        self.inner.read_input(prompt, request_id).await
    }
}

/// Reads one line from standard input per request.
#[derive(Default)]
pub struct StdinInput;

#[async_trait]
impl InputSource for StdinInput {
    async fn read_input(&self, prompt: &str, _request_id: &str) -> Result<String, Error> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| Error::Internal(format!("prompt failed: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| Error::Internal(format!("prompt failed: {e}")))?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Internal(format!("reading input failed: {e}")))?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
