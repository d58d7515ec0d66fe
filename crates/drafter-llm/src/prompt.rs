//! Message-sequence construction for the two completion flows.
//!
//! Chat requests replay a bounded window of the conversation ledger so
//! the provider sees recent context without the full transcript. The
//! generation flow is stateless: one analyst instruction plus the
//! specification (or a follow-up question) per request.

use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestMessageContentPartImage, ChatCompletionRequestMessageContentPartText,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    ImageUrl,
};
use drafter_types::models::Query;

/// How many prior exchanges are replayed to the provider. One exchange
/// is a user turn plus the assistant answer, so the wire sequence holds
/// twice this many history messages.
pub const HISTORY_WINDOW: usize = 5;

pub const CHAT_PERSONA: &str = "You are AI-powered tool that generates RESTful / GraphQL APIs based on text-based input specifications. Can Handle media files. You Automatically generate API documentation when RESTful/ GraphQL APIs are generated.";

pub const ANALYST_PERSONA: &str = "You are an expert assistant who analyzes files or text to provide insights. Answer questions based on the contents of the file or prompt provided.";

/// One incoming chat turn, before any provider formatting.
#[derive(Debug, Default)]
pub struct ChatTurn {
    pub message: String,
    pub follow_up: Option<String>,
    pub image_url: Option<String>,
    pub file_text: Option<String>,
}

impl ChatTurn {
    /// Follow-up text supersedes the primary message when both arrive.
    /// A blank follow-up counts as absent and never masks the message.
    pub fn text(&self) -> &str {
        match self.follow_up.as_deref() {
            Some(follow_up) if !follow_up.trim().is_empty() => follow_up,
            _ => &self.message,
        }
    }
}

/// Build the chat completion sequence: persona, then the tail of the
/// conversation ledger, then the current turn.
pub fn chat_messages(history: &[Query], turn: &ChatTurn) -> Vec<ChatCompletionRequestMessage> {
    let window_start = history.len().saturating_sub(HISTORY_WINDOW);

    let mut messages = vec![system(CHAT_PERSONA)];
    for past in &history[window_start..] {
        messages.push(user_text(&past.query));
        messages.push(assistant_text(&past.response));
    }
    messages.push(current_turn(turn));

    messages
}

/// Build the API-generation sequence. Callers ensure at least one of
/// the two inputs is present; a specification takes precedence.
pub fn generate_messages(
    specification: Option<&str>,
    follow_up: Option<&str>,
) -> Vec<ChatCompletionRequestMessage> {
    let request_text = match specification {
        Some(spec_text) => specification_prompt(spec_text),
        None => format!(
            "Follow-up question based on previous content: {}",
            follow_up.unwrap_or_default()
        ),
    };

    vec![system(ANALYST_PERSONA), user_text(&request_text)]
}

fn specification_prompt(specification: &str) -> String {
    format!(
        "Generate a detailed API based on the following specification:\n\
         Specification:\n\
         {specification}\n\
         Please provide:\n\
         1. A comprehensive API design\n\
         2. Sample endpoints\n\
         3. Request/Response examples\n\
         4. Any necessary data models or schemas."
    )
}

fn current_turn(turn: &ChatTurn) -> ChatCompletionRequestMessage {
    let text = turn.text();
    // Blank attachments are treated the same as missing ones.
    let image_url = turn.image_url.as_deref().filter(|url| !url.trim().is_empty());
    let file_text = turn.file_text.as_deref().filter(|file| !file.trim().is_empty());

    let content = if let Some(url) = image_url {
        ChatCompletionRequestUserMessageContent::Array(vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: text.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: url.to_string(),
                        detail: None,
                    },
                },
            ),
        ])
    } else if let Some(file_text) = file_text {
        format!("{text}\n\n{file_text}").into()
    } else {
        text.to_string().into()
    };

    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content,
        name: None,
    })
}

fn system(persona: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: persona.into(),
        name: None,
    })
}

fn user_text(text: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: text.into(),
        name: None,
    })
}

#[allow(deprecated)]
fn assistant_text(text: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
        content: Some(text.into()),
        name: None,
        tool_calls: None,
        refusal: None,
        audio: None,
        function_call: None,
    })
}
