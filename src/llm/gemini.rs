/// Gemini text generation client
use super::{CompletionProvider, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: PromptText<'a>,
}

#[derive(Debug, Serialize)]
struct PromptText<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    output: Option<String>,
}

/// Calls the `generateText` endpoint of the Generative Language API
pub struct GeminiProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: format!(
                "{}/models/{}:generateText",
                endpoint.trim_end_matches('/'),
                model
            ),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Pull the answer text out of a raw response body
fn parse_answer(body: &str) -> Result<String, LlmError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, body)))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.output)
        .ok_or_else(|| LlmError::InvalidResponse(format!("no candidates in {}", body)))
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!("Sending {} byte prompt to {}", prompt.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&GenerateRequest {
                prompt: PromptText { text: prompt },
            })
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Request(format!("HTTP {}: {}", status, body)));
        }

        parse_answer(&body)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_construction() {
        let provider = GeminiProvider::new(
            "https://example.test/v1beta/",
            "gemini-pro",
            "key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            provider.url(),
            "https://example.test/v1beta/models/gemini-pro:generateText"
        );
    }

    #[test]
    fn test_parse_answer() {
        let body = r#"{"candidates":[{"output":"Osmosis is diffusion of water."},{"output":"other"}]}"#;
        assert_eq!(parse_answer(body).unwrap(), "Osmosis is diffusion of water.");
    }

    #[test]
    fn test_parse_answer_without_candidates() {
        assert!(matches!(
            parse_answer(r#"{"filters":[{"reason":"OTHER"}]}"#),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_answer("not json"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            prompt: PromptText { text: "hi" },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"prompt": {"text": "hi"}})
        );
    }
}
