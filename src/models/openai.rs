//! OpenAI-compatible request and response bodies.

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::services::catalog::ModelEntry;
use crate::services::vendor::CreditInfo;

fn not_blank(value: &str, _context: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

/// `POST /v1/images/generations`
#[derive(Debug, Deserialize, Validate)]
pub struct ImageGenerationRequest {
    #[garde(length(max = 100))]
    #[serde(default)]
    pub model: String,

    #[garde(length(min = 1, max = 4000), custom(not_blank))]
    pub prompt: String,

    #[garde(length(max = 4000))]
    #[serde(default)]
    pub negative_prompt: String,

    #[garde(length(max = 10))]
    #[serde(default)]
    pub ratio: String,

    #[garde(length(max = 10))]
    #[serde(default)]
    pub resolution: String,

    #[garde(skip)]
    #[serde(default)]
    pub intelligent_ratio: bool,

    #[garde(range(min = 0.0, max = 1.0))]
    pub sample_strength: Option<f64>,

    #[garde(skip)]
    pub response_format: Option<String>,

    #[garde(range(min = 1, max = 4))]
    pub n: Option<usize>,
}

/// `POST /v1/videos/generations`
#[derive(Debug, Deserialize, Validate)]
pub struct VideoGenerationRequest {
    #[garde(length(max = 100))]
    #[serde(default)]
    pub model: String,

    #[garde(length(min = 1, max = 4000), custom(not_blank))]
    pub prompt: String,

    #[garde(length(max = 10))]
    #[serde(default)]
    pub ratio: String,

    #[garde(length(max = 10))]
    #[serde(default)]
    pub resolution: String,

    #[garde(range(min = 1, max = 15))]
    pub duration: Option<u32>,

    #[garde(skip)]
    pub response_format: Option<String>,
}

/// Anything other than `b64_json` means URLs.
pub fn wants_base64(response_format: Option<&str>) -> bool {
    response_format == Some("b64_json")
}

/// `POST /v1/chat/completions`
#[derive(Debug, Deserialize, Validate)]
pub struct ChatCompletionRequest {
    #[garde(length(max = 100))]
    #[serde(default)]
    pub model: String,

    #[garde(length(min = 1))]
    pub messages: Vec<ChatMessage>,

    #[garde(skip)]
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Plain text, or the multi-part array form where only text parts count.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Parts(parts) => parts
                .iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string(),
        }
    }
}

impl ChatCompletionRequest {
    /// The last message is the prompt; earlier turns are ignored.
    pub fn prompt(&self) -> String {
        self.messages.last().map(|m| m.content.text()).unwrap_or_default()
    }
}

/// `POST /token/check`
#[derive(Debug, Deserialize, Validate)]
pub struct TokenCheckRequest {
    #[garde(length(min = 1, max = 1000), custom(not_blank))]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenCheckResponse {
    pub live: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenPoints {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<CreditInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MediaData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MediaResponse {
    pub created: i64,
    pub data: Vec<MediaData>,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

impl ChatCompletion {
    pub fn new(id: String, model: String, content: String) -> Self {
        let completion_tokens = content.chars().count();
        Self {
            id,
            object: "chat.completion",
            created: chrono::Utc::now().timestamp(),
            model,
            choices: vec![ChatChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: "stop",
            }],
            usage: Usage {
                prompt_tokens: 1,
                completion_tokens,
                total_tokens: completion_tokens + 1,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: AssistantMessage,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    pub fn new(id: String, model: String, index: u32, content: String, finish_reason: Option<&'static str>) -> Self {
        Self {
            id,
            object: "chat.completion.chunk",
            created: chrono::Utc::now().timestamp(),
            model,
            choices: vec![ChunkChoice {
                index,
                delta: AssistantMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_prompt_fails_validation() {
        let request: ImageGenerationRequest = serde_json::from_str(r#"{"prompt": "   "}"#).unwrap();
        assert!(request.validate().is_err());

        let request: ImageGenerationRequest = serde_json::from_str(r#"{"prompt": "a cat"}"#).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_sample_strength_is_bounded() {
        let request: ImageGenerationRequest =
            serde_json::from_str(r#"{"prompt": "a cat", "sample_strength": 1.5}"#).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_video_duration_is_bounded() {
        let request: VideoGenerationRequest =
            serde_json::from_str(r#"{"prompt": "waves", "duration": 60}"#).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_chat_prompt_is_last_message_text() {
        let request: ChatCompletionRequest = serde_json::from_str(
            r#"{
                "model": "jimeng-4.0",
                "messages": [
                    {"role": "user", "content": "first"},
                    {"role": "user", "content": [
                        {"type": "text", "text": " a lighthouse "},
                        {"type": "image_url"}
                    ]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(request.prompt(), "a lighthouse");
        assert!(!request.stream);
    }

    #[test]
    fn test_empty_messages_fail_validation() {
        let request: ChatCompletionRequest = serde_json::from_str(r#"{"messages": []}"#).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_only_b64_json_selects_base64() {
        assert!(wants_base64(Some("b64_json")));
        assert!(!wants_base64(Some("url")));
        assert!(!wants_base64(Some("other")));
        assert!(!wants_base64(None));
    }

    #[test]
    fn test_media_response_carries_only_openai_fields() {
        let body = MediaResponse {
            created: 1,
            data: vec![MediaData {
                url: Some("https://img/a".to_string()),
                b64_json: None,
                revised_prompt: None,
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["created", "data"]);
        assert_eq!(value["data"][0], serde_json::json!({ "url": "https://img/a" }));
    }
}
