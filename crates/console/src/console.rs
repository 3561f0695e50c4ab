//! Renders an event stream to a terminal as it arrives.
//!
//! Chunks are written inline and closed with one newline when the next
//! event arrives. Every other event is printed under a header line.
//! Usage is totalled along the way and the last terminal result is
//! returned once the stream ends.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use agenx_core::error::Error;
use agenx_core::event::{StreamEvent, TerminalResult};
use agenx_core::provider::RequestUsage;
use crossterm::style::{style, Stylize};
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::debug;

use crate::input::UserInputManager;
use crate::render::{banner, header, message_to_text, render_event, role_color, usage_line};

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The stream ended without a terminal event.
    #[error("No TaskResult or Response was processed.")]
    StreamExhausted,

    /// The producer failed mid-stream.
    #[error(transparent)]
    Upstream(#[from] Error),

    #[error("Console output failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Chunks written inline and not yet closed with a newline.
#[derive(Default)]
struct ChunkRun {
    source: Option<String>,
    text: String,
}

/// Renders event streams to a writer.
pub struct Console<W: Write = std::io::Stdout> {
    out: W,
    output_stats: bool,
    colored: bool,
    input_manager: Option<Arc<UserInputManager>>,
    total_usage: RequestUsage,
}

impl Console<std::io::Stdout> {
    /// A coloured console on standard output.
    pub fn stdout() -> Self {
        Console::new(std::io::stdout()).with_colors(true)
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            output_stats: false,
            colored: false,
            input_manager: None,
            total_usage: RequestUsage::default(),
        }
    }

    /// Print summary blocks and per-message token counts.
    pub fn with_output_stats(mut self, enabled: bool) -> Self {
        self.output_stats = enabled;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.colored = enabled;
        self
    }

    pub fn with_input_manager(mut self, manager: Arc<UserInputManager>) -> Self {
        self.input_manager = Some(manager);
        self
    }

    /// Usage totalled over everything consumed so far.
    pub fn total_usage(&self) -> RequestUsage {
        self.total_usage
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print(&mut self, source: &str, text: &str, end: &str) -> std::io::Result<()> {
        if self.colored {
            write!(self.out, "{}{end}", style(text).with(role_color(source)))?;
        } else {
            write!(self.out, "{text}{end}")?;
        }
        self.out.flush()
    }

    fn add_usage(&mut self, source: &str, usage: &RequestUsage) -> std::io::Result<()> {
        if self.output_stats {
            self.print(source, &usage_line(usage), "\n")?;
        }
        self.total_usage.accumulate(usage);
        Ok(())
    }

    /// Close an open run of chunks with a newline. Returns its source.
    fn flush_chunks(&mut self, run: &mut ChunkRun) -> std::io::Result<Option<String>> {
        let Some(source) = run.source.take() else {
            return Ok(None);
        };
        debug!(source = %source, chars = run.text.len(), "Flushing streamed chunks");
        run.text.clear();
        self.print(&source, "", "\n")?;
        Ok(Some(source))
    }

    /// Consume the stream to its end and return the last terminal result.
    pub async fn consume<S>(&mut self, mut stream: S) -> Result<TerminalResult, ConsoleError>
    where
        S: Stream<Item = Result<StreamEvent, Error>> + Unpin,
    {
        let start = Instant::now();
        let mut last: Option<TerminalResult> = None;
        let mut run = ChunkRun::default();

        while let Some(item) = stream.next().await {
            let event = item?;
            let title = header(&event);
            match event {
                StreamEvent::Terminal {
                    result: TerminalResult::TaskResult(result),
                } => {
                    self.flush_chunks(&mut run)?;
                    if self.output_stats {
                        let output = format!(
                            "{}\nNumber of messages: {}\nFinish reason: {}\nTotal prompt tokens: {}\nTotal completion tokens: {}\nDuration: {:.2} seconds\n",
                            banner("Summary"),
                            result.messages.len(),
                            result.stop_reason.as_deref().unwrap_or("None"),
                            self.total_usage.prompt_tokens,
                            self.total_usage.completion_tokens,
                            start.elapsed().as_secs_f64(),
                        );
                        self.print("team", &output, "")?;
                    }
                    last = Some(TerminalResult::TaskResult(result));
                }

                StreamEvent::Terminal {
                    result: TerminalResult::Response(response),
                } => {
                    self.flush_chunks(&mut run)?;
                    let source = response.chat_message.source.clone();
                    let output = format!(
                        "{}\n{}\n",
                        banner(&source),
                        message_to_text(&response.chat_message)
                    );
                    self.print(&source, &output, "")?;
                    if let Some(usage) = response.chat_message.usage {
                        self.add_usage(&source, &usage)?;
                    }
                    if self.output_stats {
                        let output = format!(
                            "{}\nNumber of inner messages: {}\nTotal prompt tokens: {}\nTotal completion tokens: {}\nDuration: {:.2} seconds\n",
                            banner("Summary"),
                            response.inner_messages.len(),
                            self.total_usage.prompt_tokens,
                            self.total_usage.completion_tokens,
                            start.elapsed().as_secs_f64(),
                        );
                        self.print(&source, &output, "")?;
                    }
                    last = Some(TerminalResult::Response(response));
                }

                StreamEvent::UserInputRequested { request_id, .. } => {
                    self.flush_chunks(&mut run)?;
                    if let Some(manager) = &self.input_manager {
                        manager.notify_event_received(&request_id).await;
                    }
                }

                StreamEvent::Chunk { source, content } => {
                    if run.source.as_deref() != Some(source.as_str()) {
                        self.flush_chunks(&mut run)?;
                        self.print(&source, &title, "\n")?;
                        run.source = Some(source.clone());
                    }
                    self.print(&source, &content, "")?;
                    run.text.push_str(&content);
                }

                other => {
                    let flushed = self.flush_chunks(&mut run)?;
                    // The completed message repeats what was just streamed
                    let repeats_stream = matches!(
                        (&other, &flushed),
                        (StreamEvent::Chat { message }, Some(source)) if &message.source == source
                    );
                    if !repeats_stream {
                        let source = other.source().to_string();
                        self.print(&source, &title, "\n")?;
                        self.print(&source, &render_event(&other), "\n")?;
                    }
                    if let Some(usage) = other.usage() {
                        self.add_usage(other.source(), &usage)?;
                    }
                }
            }
        }

        self.flush_chunks(&mut run)?;
        last.ok_or(ConsoleError::StreamExhausted)
    }
}
