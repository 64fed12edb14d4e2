//! Integration with the Gemini generative language API.
//!
//! Single-turn generation and chat continuation both go through the REST
//! `generateContent` endpoint; a chat session is the seeded history followed by
//! the new user turn. Binary parts travel as base64 `inlineData`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{Blob, Candidate, Content, ModelResponse, Part, Res, Role},
};

use super::{GenericLlmClient, LlmClient};

// Extra methods on `LlmClient` applied by the gemini implementation.

impl LlmClient {
    pub fn gemini(config: &Config) -> Self {
        let client = GeminiLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Wire types.

#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    #[serde_as(as = "Base64")]
    data: Vec<u8>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireInlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
struct WireRequest {
    contents: Vec<WireContent>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text(text) => WirePart {
                text: Some(text),
                inline_data: None,
            },
            Part::Blob(Blob { mime_type, data }) => WirePart {
                text: None,
                inline_data: Some(WireInlineData { mime_type, data }),
            },
        }
    }
}

impl From<Content> for WireContent {
    fn from(content: Content) -> Self {
        WireContent {
            role: Some(content.role),
            parts: content.parts.into_iter().map(WirePart::from).collect(),
        }
    }
}

impl From<WireResponse> for ModelResponse {
    fn from(response: WireResponse) -> Self {
        let candidates = response
            .candidates
            .into_iter()
            .map(|candidate| Candidate {
                parts: candidate
                    .content
                    .map(|content| content.parts)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|part| match part {
                        WirePart { inline_data: Some(WireInlineData { mime_type, data }), .. } => Some(Part::Blob(Blob { mime_type, data })),
                        WirePart { text: Some(text), .. } => Some(Part::Text(text)),
                        _ => None,
                    })
                    .collect(),
            })
            .collect();

        ModelResponse { candidates }
    }
}

// Specific implementations.

/// Gemini LLM client implementation.
#[derive(Clone)]
pub struct GeminiLlmClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiLlmClient {
    /// Create a new Gemini LLM client.
    #[instrument(name = "GeminiLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
        }
    }

    /// Call `generateContent` with the full list of turns.
    async fn call_gemini_api(&self, contents: Vec<Content>) -> Res<ModelResponse> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let request = WireRequest {
            contents: contents.into_iter().map(WireContent::from).collect(),
        };

        debug!("Sending {} turns to Gemini model `{}`", request.contents.len(), self.model);

        let response = self.http.post(&url).header("x-goog-api-key", &self.api_key).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gemini API {status}: {body}"));
        }

        let response: ModelResponse = response.json::<WireResponse>().await?.into();

        info!("Gemini response has {} candidates.", response.candidates.len());

        Ok(response)
    }
}

#[async_trait]
impl GenericLlmClient for GeminiLlmClient {
    #[instrument(name = "GeminiLlmClient::generate_content", skip_all)]
    async fn generate_content(&self, parts: Vec<Part>) -> Res<ModelResponse> {
        self.call_gemini_api(vec![Content { role: Role::User, parts }]).await
    }

    #[instrument(name = "GeminiLlmClient::send_chat_message", skip_all)]
    async fn send_chat_message(&self, history: Vec<Content>, parts: Vec<Part>) -> Res<ModelResponse> {
        let mut contents = history;
        contents.push(Content { role: Role::User, parts });

        self.call_gemini_api(contents).await
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::base::config::ConfigInner;

    fn create_test_config(api_base: &str) -> Config {
        Config {
            inner: Arc::new(ConfigInner {
                slack_bot_token: "xoxb-test".to_string(),
                gemini_api_key: "gm-test".to_string(),
                gemini_model: "gemini-1.5-flash".to_string(),
                gemini_api_base: api_base.to_string(),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_generate_content_sends_text_and_inline_data() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/models/gemini-1.5-flash:generateContent")
                    .header("x-goog-api-key", "gm-test")
                    .json_body_includes(
                        json!({
                            "contents": [{
                                "role": "user",
                                "parts": [
                                    {"text": "describe this"},
                                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw=="}}
                                ]
                            }]
                        })
                        .to_string(),
                    );
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "A **tiny** image."}]},
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await;

        let client = LlmClient::gemini(&create_test_config(&server.base_url()));
        let blob = Blob {
            mime_type: "image/png".to_string(),
            data: vec![0x89, 0x50, 0x4e, 0x47],
        };

        let response = client.generate_content(vec![Part::Text("describe this".to_string()), Part::Blob(blob)]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.candidates.len(), 1);
        assert_eq!(response.candidates[0].parts, vec![Part::Text("A **tiny** image.".to_string())]);
    }

    #[tokio::test]
    async fn test_chat_message_appends_turn_to_history() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/models/gemini-1.5-flash:generateContent").json_body_includes(
                    json!({
                        "contents": [
                            {"role": "user", "parts": [{"text": "draw a cat"}]},
                            {"role": "model", "parts": [{"text": "Here you go."}]},
                            {"role": "user", "parts": [{"text": "now a dog"}]}
                        ]
                    })
                    .to_string(),
                );
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [
                                {"text": "Woof."},
                                {"inlineData": {"mimeType": "image/png", "data": "iVBORw=="}}
                            ]
                        }
                    }]
                }));
            })
            .await;

        let client = LlmClient::gemini(&create_test_config(&server.base_url()));
        let history = vec![
            Content {
                role: Role::User,
                parts: vec![Part::Text("draw a cat".to_string())],
            },
            Content {
                role: Role::Model,
                parts: vec![Part::Text("Here you go.".to_string())],
            },
        ];

        let response = client.send_chat_message(history, vec![Part::Text("now a dog".to_string())]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            response.candidates[0].parts,
            vec![
                Part::Text("Woof.".to_string()),
                Part::Blob(Blob {
                    mime_type: "image/png".to_string(),
                    data: vec![0x89, 0x50, 0x4e, 0x47],
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_api_error_is_returned() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST);
                then.status(400).json_body(json!({"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}));
            })
            .await;

        let client = LlmClient::gemini(&create_test_config(&server.base_url()));
        let error = client.generate_content(vec![Part::Text("hi".to_string())]).await.unwrap_err();

        assert!(error.to_string().contains("API key not valid."));
    }

    #[tokio::test]
    async fn test_blocked_candidate_has_no_parts() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST);
                then.status(200).json_body(json!({"candidates": [{"finishReason": "SAFETY"}]}));
            })
            .await;

        let client = LlmClient::gemini(&create_test_config(&server.base_url()));
        let response = client.generate_content(vec![Part::Text("hi".to_string())]).await.unwrap();

        assert_eq!(response.candidates.len(), 1);
        assert!(response.candidates[0].parts.is_empty());
    }
}
