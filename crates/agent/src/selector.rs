//! Speaker selection: asks a model which participant speaks next.
//!
//! The selector sees only the speaking order (who spoke, in order,
//! duplicates included). Its answer must be one of the names in that
//! order; anything else means "no selection" and the caller decides.

use std::collections::HashSet;
use std::sync::Arc;

use agenx_core::error::Error;
use agenx_core::message::Message;
use agenx_core::provider::{ModelBackend, ModelRequest};
use agenx_core::CancellationToken;
use tracing::{debug, info};

/// Instruction sent with every selection request.
pub const SELECT_PROMPT: &str = "There is a scientific task that needs many agents to deal with. \
They are in different functions and backgrounds. See the speaking order currently, then select \
an agent from participants to perform the next speaking.\n\nNote: **Only select one agent.**";

/// Picks the next speaker from the speaking order.
#[derive(Clone)]
pub struct Selector {
    backend: Arc<dyn ModelBackend>,
}

impl Selector {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    /// The source of every message, in order.
    pub fn speaking_order(history: &[Message]) -> Vec<String> {
        history.iter().map(|m| m.source.clone()).collect()
    }

    /// Ask the backend for the next speaker.
    ///
    /// Returns `None` for an empty history (without calling the backend)
    /// and for any answer that is not a name from the speaking order.
    pub async fn select_next(
        &self,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Option<String>, Error> {
        let order = Self::speaking_order(history);
        if order.is_empty() {
            return Ok(None);
        }

        let rendered = serde_json::to_string(&order)?;
        debug!(order = %rendered, "Selecting next speaker");

        let request = ModelRequest::new(vec![
            Message::system(SELECT_PROMPT),
            Message::user("user", rendered),
        ]);
        let result = self
            .backend
            .create(request, cancel)
            .await
            .map_err(|e| Error::in_mode("selector", e))?;

        let answer = result.content.to_text();
        let selection = answer.trim();
        let participants: HashSet<&str> = order.iter().map(String::as_str).collect();

        if participants.contains(selection) {
            info!(selection, "Next speaker selected");
            Ok(Some(selection.to_string()))
        } else {
            info!(answer = selection, "Selection is not a known participant");
            Ok(None)
        }
    }
}
