//! The ChatAgent trait: anything that can take a turn in a team.

use agenx_core::error::Error;
use agenx_core::event::{EventStream, Response, TerminalResult};
use agenx_core::message::Message;
use agenx_core::CancellationToken;
use async_trait::async_trait;

/// A participant in a group chat.
///
/// `on_messages_stream` starts a turn in the background and returns its
/// events right away; the stream ends with exactly one terminal
/// [`Response`] or with an error.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    fn name(&self) -> &str;

    /// What the agent does, shown to whoever picks speakers.
    fn description(&self) -> &str;

    /// Start a turn on the messages the agent has not seen yet.
    fn on_messages_stream(&self, messages: Vec<Message>, cancel: CancellationToken) -> EventStream;

    /// Run a turn to completion and return its response.
    async fn on_messages(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<Response, Error> {
        let mut stream = self.on_messages_stream(messages, cancel);
        let mut response = None;
        while let Some(event) = stream.recv().await {
            if let agenx_core::StreamEvent::Terminal {
                result: TerminalResult::Response(r),
            } = event?
            {
                response = Some(r);
            }
        }
        response.ok_or_else(|| Error::Internal(format!("{} finished without a response", self.name())))
    }
}
