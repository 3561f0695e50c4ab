//! Pure rendering of stream events to display text.
//!
//! Nothing here touches the terminal; the console decides where the text
//! goes and how it is coloured.

use agenx_core::event::{StreamEvent, TerminalResult};
use agenx_core::message::{ContentPart, Message, MessageContent};
use agenx_core::provider::RequestUsage;
use crossterm::style::Color;

/// Shown instead of an empty message.
pub const EMPTY_MESSAGE: &str = "(PriM: It seems there is no any response from the agent)";

/// Agent-name fragments and their colours, checked in order.
const ROLE_COLORS: &[(&str, Color)] = &[
    ("user_proxy", Color::Cyan),
    ("hypothesis", Color::Yellow),
    ("search", Color::Green),
    ("experiment", Color::Magenta),
    ("analysis", Color::Blue),
];

/// Colour for text from `source`.
pub fn role_color(source: &str) -> Color {
    let source = source.to_lowercase();
    ROLE_COLORS
        .iter()
        .find(|(role, _)| source.contains(role))
        .map(|(_, color)| *color)
        .unwrap_or(Color::White)
}

fn dashes() -> String {
    "-".repeat(10)
}

/// `---------- {kind} ({source}) ----------`
pub fn header(event: &StreamEvent) -> String {
    format!("{d} {} ({}) {d}", event.kind(), event.source(), d = dashes())
}

/// `---------- {title} ----------`
pub fn banner(title: &str) -> String {
    format!("{d} {title} {d}", d = dashes())
}

pub fn usage_line(usage: &RequestUsage) -> String {
    format!(
        "[Prompt tokens: {}, Completion tokens: {}]",
        usage.prompt_tokens, usage.completion_tokens
    )
}

/// Display text of a chat message.
pub fn message_to_text(message: &Message) -> String {
    let text = match &message.content {
        MessageContent::MultiModal(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => text.clone(),
                ContentPart::Image { .. } => "<image>".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_text(),
    };
    if text.is_empty() {
        EMPTY_MESSAGE.to_string()
    } else {
        text
    }
}

/// Tool output as indented JSON when it parses, raw text otherwise.
fn pretty_content(content: &str) -> String {
    serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| content.to_string())
}

/// Display text of one event.
pub fn render_event(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Chunk { content, .. } => content.clone(),
        StreamEvent::Thought { content, .. } => content.clone(),
        StreamEvent::MemoryQuery { contents, .. } => contents
            .iter()
            .map(|c| c.content.clone())
            .collect::<Vec<_>>()
            .join("\n"),
        StreamEvent::ToolCallRequest { calls, .. } => calls
            .iter()
            .map(|c| format!("🔧(id={}) \n{}({})", c.id, c.name, c.arguments))
            .collect::<Vec<_>>()
            .join("\n"),
        StreamEvent::ToolCallExecution { results, .. } => results
            .iter()
            .map(|r| format!("⚙️(id={}) \n{}", r.call_id, pretty_content(&r.content)))
            .collect::<Vec<_>>()
            .join("\n"),
        // The summary text arrives again as the turn's chat message
        StreamEvent::ToolCallSummary { .. } => String::new(),
        StreamEvent::Chat { message } => message_to_text(message),
        // Only a signal for the input manager
        StreamEvent::UserInputRequested { .. } => String::new(),
        StreamEvent::Termination { reason, .. } => reason.clone(),
        StreamEvent::Terminal {
            result: TerminalResult::Response(response),
        } => message_to_text(&response.chat_message),
        StreamEvent::Terminal {
            result: TerminalResult::TaskResult(result),
        } => result.stop_reason.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenx_core::event::{Response, TaskResult};
    use agenx_core::memory::MemoryContent;
    use agenx_core::message::{FunctionCall, FunctionExecutionResult};

    fn one_of_each() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Chunk {
                source: "Planner_Agent".into(),
                content: "Hi".into(),
            },
            StreamEvent::Thought {
                source: "Planner_Agent".into(),
                content: "hmm".into(),
            },
            StreamEvent::MemoryQuery {
                source: "Planner_Agent".into(),
                contents: vec![MemoryContent::text("remembered")],
            },
            StreamEvent::ToolCallRequest {
                source: "Experiment_Agent".into(),
                calls: vec![FunctionCall {
                    id: "call_1".into(),
                    name: "characterize_pchembl_value".into(),
                    arguments: r#"{"smiles":"CCO"}"#.into(),
                }],
                usage: None,
            },
            StreamEvent::ToolCallExecution {
                source: "Experiment_Agent".into(),
                results: vec![FunctionExecutionResult {
                    call_id: "call_1".into(),
                    name: "characterize_pchembl_value".into(),
                    content: r#"{"output":5.23}"#.into(),
                    is_error: false,
                }],
            },
            StreamEvent::ToolCallSummary {
                source: "Experiment_Agent".into(),
                content: "5.23".into(),
            },
            StreamEvent::Chat {
                message: Message::assistant("Hypothesis_Agent", "Try CCN"),
            },
            StreamEvent::UserInputRequested {
                source: "user_proxy".into(),
                request_id: "r1".into(),
            },
            StreamEvent::Termination {
                source: "GroupChatManager".into(),
                reason: "Text 'TERMINATE' mentioned".into(),
            },
            StreamEvent::response(Response {
                chat_message: Message::assistant("Planner_Agent", "done"),
                inner_messages: vec![],
                usage: RequestUsage::default(),
            }),
            StreamEvent::task_result(TaskResult {
                messages: vec![],
                stop_reason: Some("Maximum number of turns 20 reached.".into()),
            }),
        ]
    }

    #[test]
    fn every_variant_has_a_render_rule() {
        let expected = [
            "Hi",
            "hmm",
            "remembered",
            "🔧(id=call_1) \ncharacterize_pchembl_value({\"smiles\":\"CCO\"})",
            "⚙️(id=call_1) \n{\n  \"output\": 5.23\n}",
            "",
            "Try CCN",
            "",
            "Text 'TERMINATE' mentioned",
            "done",
            "Maximum number of turns 20 reached.",
        ];
        let events = one_of_each();
        assert_eq!(events.len(), expected.len());
        for (event, expected) in events.iter().zip(expected) {
            assert_eq!(render_event(event), expected, "{}", event.kind());
        }
    }

    #[test]
    fn unparseable_tool_output_is_shown_raw() {
        let event = StreamEvent::ToolCallExecution {
            source: "Experiment_Agent".into(),
            results: vec![FunctionExecutionResult {
                call_id: "c".into(),
                name: "t".into(),
                content: "Error: timeout".into(),
                is_error: true,
            }],
        };
        assert_eq!(render_event(&event), "⚙️(id=c) \nError: timeout");
    }

    #[test]
    fn empty_messages_get_a_placeholder() {
        let message = Message::assistant("Planner_Agent", "");
        assert_eq!(message_to_text(&message), EMPTY_MESSAGE);
    }

    #[test]
    fn images_render_as_placeholders() {
        let message = Message::user(
            "user",
            MessageContent::MultiModal(vec![
                ContentPart::Text {
                    text: "Look:".into(),
                },
                ContentPart::Image {
                    url: "file://mol.png".into(),
                },
            ]),
        );
        assert_eq!(message_to_text(&message), "Look:\n<image>");
    }

    #[test]
    fn colors_follow_agent_roles() {
        assert_eq!(role_color("Hypothesis_Agent"), Color::Yellow);
        assert_eq!(role_color("Experiment_Agent"), Color::Magenta);
        assert_eq!(role_color("user_proxy"), Color::Cyan);
        assert_eq!(role_color("Planner_Agent"), Color::White);
    }

    #[test]
    fn header_names_kind_and_source() {
        let event = StreamEvent::Thought {
            source: "Planner_Agent".into(),
            content: String::new(),
        };
        assert_eq!(
            header(&event),
            "---------- ThoughtEvent (Planner_Agent) ----------"
        );
    }
}
