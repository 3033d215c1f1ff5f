//! `generateContent` REST client for reasoning and speech synthesis.
//!
//! Both services share one `reqwest::Client` and API key; they differ only
//! in the model and request shape:
//!
//! ```text
//! reasoning: [prompt text, inlineData audio/wav, inlineData image?] + tools
//!            → parts: text* | functionCall*
//! tts:       text + responseModalities [AUDIO] + prebuilt voice
//!            → parts: inlineData audio/L16;rate=24000 (base64 PCM)
//! ```

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use super::declarations;
use super::{CloudError, ReasoningReply, ReasoningService, SpeechSynthesizer};
use crate::audio::encode_wav;
use crate::broker::{FunctionCall, ReasoningRequest, SpeechAudio};
use crate::config::{CloudConfig, ReasoningConfig, TtsConfig};

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

// ---------------------------------------------------------------------------
// GeminiClient
// ---------------------------------------------------------------------------

/// `generateContent` client for both reasoning and speech synthesis.  Cheap to
/// clone; clones share one connection pool.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    reasoning: ReasoningConfig,
    tts: TtsConfig,
    tools: Value,
}

impl GeminiClient {
    /// Build a client from config and an already resolved API key.
    pub fn from_config(config: &CloudConfig, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            reasoning: config.reasoning.clone(),
            tts: config.tts.clone(),
            tools: declarations::tools(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    async fn generate(&self, model: &str, body: &Value) -> Result<Value, CloudError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CloudError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Status {
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CloudError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ReasoningService for GeminiClient {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningReply, CloudError> {
        let wav = encode_wav(request.utterance.samples(), request.utterance.sample_rate())?;
        let body = reasoning_body(&self.reasoning.prompt_template, &wav, request, &self.tools);
        let response = self.generate(&self.reasoning.model, &body).await?;
        parse_reasoning_reply(&response)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, CloudError> {
        let body = tts_body(text, &self.tts.voice);
        let response = self.generate(&self.tts.model, &body).await?;
        parse_speech(&response, self.tts.sample_rate)
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

fn reasoning_body(prompt: &str, wav: &[u8], request: &ReasoningRequest, tools: &Value) -> Value {
    let mut parts = vec![
        json!({ "text": prompt }),
        json!({ "inlineData": { "mimeType": "audio/wav", "data": BASE64.encode(wav) } }),
    ];
    if let Some(image) = &request.image {
        parts.push(json!({
            "inlineData": { "mimeType": image.mime_type, "data": BASE64.encode(&image.bytes) }
        }));
    }

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "tools": tools,
    })
}

fn tts_body(text: &str, voice: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn first_candidate_parts(response: &Value) -> Result<&Vec<Value>, CloudError> {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .filter(|parts| !parts.is_empty())
        .ok_or(CloudError::EmptyResponse)
}

/// Collect every text part and every function call of the first candidate.
fn parse_reasoning_reply(response: &Value) -> Result<ReasoningReply, CloudError> {
    let parts = first_candidate_parts(response)?;

    let mut texts = Vec::new();
    let mut function_calls = Vec::new();
    for part in parts {
        if let Some(call) = part.get("functionCall") {
            let call: FunctionCall = serde_json::from_value(call.clone())
                .map_err(|e| CloudError::Parse(format!("functionCall: {e}")))?;
            function_calls.push(call);
        } else if let Some(text) = part["text"].as_str() {
            let text = text.trim();
            if !text.is_empty() {
                texts.push(text);
            }
        }
    }

    let text = (!texts.is_empty()).then(|| texts.join(" "));
    Ok(ReasoningReply {
        text,
        function_calls,
    })
}

/// Decode the first inline audio part as little-endian 16-bit PCM.
fn parse_speech(response: &Value, default_rate: u32) -> Result<SpeechAudio, CloudError> {
    let parts = first_candidate_parts(response)?;
    let inline = parts
        .iter()
        .find_map(|part| part.get("inlineData"))
        .ok_or(CloudError::EmptyResponse)?;

    let data = inline["data"]
        .as_str()
        .ok_or_else(|| CloudError::Parse("inlineData without data".into()))?;
    let pcm = BASE64
        .decode(data)
        .map_err(|e| CloudError::Parse(format!("audio payload: {e}")))?;
    if pcm.is_empty() {
        return Err(CloudError::EmptyResponse);
    }

    let rate = inline["mimeType"]
        .as_str()
        .and_then(rate_from_mime)
        .unwrap_or(default_rate);
    Ok(SpeechAudio::from_le_bytes(&pcm, rate))
}

/// `audio/L16;codec=pcm;rate=24000` → `24000`.
fn rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
