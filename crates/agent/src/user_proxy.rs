//! User proxy: a participant whose turns are typed by a human.

use std::sync::Arc;

use agenx_core::error::Error;
use agenx_core::event::{EventStream, Response, StreamEvent};
use agenx_core::message::Message;
use agenx_core::provider::RequestUsage;
use agenx_core::CancellationToken;
use async_trait::async_trait;
use tracing::debug;

use crate::agent::ChatAgent;

/// Where a user proxy gets its text from.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Read one reply. `request_id` matches the `UserInputRequested` event.
    async fn read_input(&self, prompt: &str, request_id: &str) -> Result<String, Error>;
}

/// A participant that hands its turn to a human.
pub struct UserProxyAgent {
    name: String,
    description: String,
    input: Arc<dyn InputSource>,
}

impl UserProxyAgent {
    pub fn new(name: impl Into<String>, input: Arc<dyn InputSource>) -> Self {
        Self {
            name: name.into(),
            description: "A human user".into(),
            input,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl ChatAgent for UserProxyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn on_messages_stream(&self, _messages: Vec<Message>, cancel: CancellationToken) -> EventStream {
        let (events, stream) = EventStream::channel(4);
        let name = self.name.clone();
        let input = self.input.clone();

        tokio::spawn(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            events
                .emit(StreamEvent::UserInputRequested {
                    source: name.clone(),
                    request_id: request_id.clone(),
                })
                .await;
            debug!(agent = %name, request_id = %request_id, "Waiting for user input");

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                reply = input.read_input("Enter your response: ", &request_id) => reply,
            };

            match reply {
                Ok(text) => {
                    events
                        .emit(StreamEvent::response(Response {
                            chat_message: Message::user(&name, text),
                            inner_messages: Vec::new(),
                            usage: RequestUsage::default(),
                        }))
                        .await
                }
                Err(e) => events.fail(e).await,
            }
        });

        stream
    }
}
