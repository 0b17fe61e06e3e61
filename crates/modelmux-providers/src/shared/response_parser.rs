//! Shared response-parsing helpers. Each provider's wire format is close
//! enough to OpenAI's or Anthropic's that the adapters just plug their JSON
//! shape into one of these rather than hand-rolling extraction twice.

use modelmux_core::error::OrchestrationError;
use modelmux_core::traits::GenerateOutcome;
use serde_json::Value;

fn malformed(provider: &str, reason: impl Into<String>) -> OrchestrationError {
    OrchestrationError::ProviderUnavailable {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

/// Parse an OpenAI-shaped chat completion response.
pub fn parse_openai_chat_response(provider: &str, response: &Value) -> Result<GenerateOutcome, OrchestrationError> {
    let content = response["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| malformed(provider, "missing choices[0].message.content"))?
        .to_string();

    Ok(GenerateOutcome {
        content,
        input_tokens: response["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: response["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        finish_reason: response["choices"][0]["finish_reason"].as_str().map(String::from),
    })
}

/// Parse an Anthropic-shaped messages response.
pub fn parse_anthropic_response(provider: &str, response: &Value) -> Result<GenerateOutcome, OrchestrationError> {
    let content = response["content"][0]["text"]
        .as_str()
        .ok_or_else(|| malformed(provider, "missing content[0].text"))?
        .to_string();

    Ok(GenerateOutcome {
        content,
        input_tokens: response["usage"]["input_tokens"].as_u64().unwrap_or(0),
        output_tokens: response["usage"]["output_tokens"].as_u64().unwrap_or(0),
        finish_reason: response["stop_reason"].as_str().map(String::from),
    })
}

/// Parse a Gemini-shaped `generateContent` response.
pub fn parse_gemini_response(provider: &str, response: &Value) -> Result<GenerateOutcome, OrchestrationError> {
    let content = response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| malformed(provider, "missing candidates[0].content.parts[0].text"))?
        .to_string();

    Ok(GenerateOutcome {
        content,
        input_tokens: response["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
        output_tokens: response["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
        finish_reason: response["candidates"][0]["finishReason"].as_str().map(String::from),
    })
}
