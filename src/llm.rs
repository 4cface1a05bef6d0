//! Generation providers and prompt assembly.
//!
//! Three providers are supported: Google Gemini (native REST API), xAI
//! Grok, and Kimi via NVIDIA NIM (both OpenAI-compatible chat
//! completions). API keys come from the environment (`GEMINI_API_KEY`,
//! `GROK_API_KEY`, `KIMI_API_KEY`); model names come from config.
//!
//! Generation is a single synchronous call with no retry — failures
//! propagate to the caller, which decides how to surface them.

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::config::LlmConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GROK_BASE_URL: &str = "https://api.x.ai/v1";
const KIMI_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

const QA_MAX_TOKENS: u32 = 4096;
const EDIT_MAX_TOKENS: u32 = 8192;

/// A provider visible to clients, with the model it would use.
#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub model: String,
}

/// Providers whose API keys are present in the environment.
pub fn available_providers(config: &LlmConfig) -> Vec<ProviderInfo> {
    let mut providers = Vec::new();
    if std::env::var("GEMINI_API_KEY").is_ok() {
        providers.push(ProviderInfo {
            id: "gemini",
            name: "Google Gemini",
            model: config.gemini_model.clone(),
        });
    }
    if std::env::var("GROK_API_KEY").is_ok() {
        providers.push(ProviderInfo {
            id: "grok",
            name: "xAI Grok",
            model: config.grok_model.clone(),
        });
    }
    if std::env::var("KIMI_API_KEY").is_ok() {
        providers.push(ProviderInfo {
            id: "kimi",
            name: "Kimi",
            model: config.kimi_model.clone(),
        });
    }
    providers
}

/// Clamp a requested provider to a known one, defaulting unknown names.
pub fn resolve_provider<'a>(requested: &'a str, config: &'a LlmConfig) -> &'a str {
    match requested {
        "gemini" | "grok" | "kimi" => requested,
        _ => config.default_provider.as_str(),
    }
}

fn api_key(env_var: &str) -> Result<String> {
    std::env::var(env_var)
        .map_err(|_| anyhow!("{env_var} is not set. Please add it to your environment."))
}

/// Route a generation request to the named provider.
pub async fn generate(
    config: &LlmConfig,
    provider: &str,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    info!(
        provider,
        chars = prompt.len(),
        temperature,
        "LLM call"
    );

    let result = match provider {
        "grok" => {
            generate_openai_compatible(
                config,
                GROK_BASE_URL,
                &api_key("GROK_API_KEY")?,
                &config.grok_model,
                prompt,
                temperature,
                max_tokens,
            )
            .await?
        }
        "kimi" => {
            generate_openai_compatible(
                config,
                KIMI_BASE_URL,
                &api_key("KIMI_API_KEY")?,
                &config.kimi_model,
                prompt,
                temperature,
                max_tokens,
            )
            .await?
        }
        _ => generate_gemini(config, prompt, temperature, max_tokens).await?,
    };

    info!(provider, chars = result.len(), "LLM responded");
    Ok(result)
}

async fn generate_gemini(
    config: &LlmConfig,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    let key = api_key("GEMINI_API_KEY")?;
    let client = http_client(config)?;

    let body = serde_json::json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": temperature,
            "maxOutputTokens": max_tokens,
        },
    });

    let url = format!(
        "{}/models/{}:generateContent",
        GEMINI_BASE_URL, config.gemini_model
    );
    let response = client
        .post(&url)
        .header("x-goog-api-key", key)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("Gemini API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.pointer("/content/parts/0/text"))
        .and_then(|t| t.as_str())
        .map(|t| t.to_string())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidate text"))
}

async fn generate_openai_compatible(
    config: &LlmConfig,
    base_url: &str,
    key: &str,
    model: &str,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    let client = http_client(config)?;

    let body = serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": temperature,
        "max_tokens": max_tokens,
    });

    let response = client
        .post(format!("{base_url}/chat/completions"))
        .header("Authorization", format!("Bearer {key}"))
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("Chat completions API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    json.pointer("/choices/0/message/content")
        .and_then(|t| t.as_str())
        .map(|t| t.to_string())
        .ok_or_else(|| anyhow!("Invalid chat completions response: missing message content"))
}

fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

// ============ Prompts ============

fn qa_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an expert code analyst. You are analyzing a software project.\n\
         You have access to the following relevant code from the repository:\n\
         \n\
         {context}\n\
         \n\
         ---\n\
         \n\
         User Question:\n\
         {question}\n\
         \n\
         ---\n\
         \n\
         Instructions:\n\
         - Answer the question based on the code above.\n\
         - Reference specific files and functions when relevant.\n\
         - If the code doesn't contain enough information to fully answer, say so.\n\
         - Use markdown formatting for clarity.\n\
         - Be concise but thorough.\n"
    )
}

fn edit_prompt(context: &str, file_content: &str, file_path: &str, instruction: &str) -> String {
    format!(
        "You are an expert software engineer. You need to modify a source file.\n\
         \n\
         Here is relevant context from the project:\n\
         \n\
         {context}\n\
         \n\
         ---\n\
         \n\
         File to modify: {file_path}\n\
         \n\
         ```\n\
         {file_content}\n\
         ```\n\
         \n\
         ---\n\
         \n\
         Modification instruction:\n\
         {instruction}\n\
         \n\
         ---\n\
         \n\
         IMPORTANT RULES:\n\
         1. Return the COMPLETE modified file content.\n\
         2. Do NOT omit any existing code unless the instruction specifically asks to remove it.\n\
         3. Do NOT add explanatory comments unless asked.\n\
         4. Return ONLY the code, no markdown code fences, no explanations before or after.\n\
         5. Preserve the original formatting style, indentation, and conventions.\n"
    )
}

/// Ask a question about a project with retrieved code context.
pub async fn ask_question(
    config: &LlmConfig,
    context: &str,
    question: &str,
    provider: &str,
) -> Result<String> {
    let prompt = qa_prompt(context, question);
    generate(
        config,
        provider,
        &prompt,
        config.chat_temperature,
        QA_MAX_TOKENS,
    )
    .await
}

/// Ask for a complete modified version of one file.
pub async fn generate_code_edit(
    config: &LlmConfig,
    context: &str,
    file_content: &str,
    file_path: &str,
    instruction: &str,
    provider: &str,
) -> Result<String> {
    let prompt = edit_prompt(context, file_content, file_path, instruction);
    let result = generate(
        config,
        provider,
        &prompt,
        config.code_temperature,
        EDIT_MAX_TOKENS,
    )
    .await?;

    Ok(strip_code_fences(&result))
}

/// Models keep wrapping whole-file answers in fences despite the prompt;
/// peel one outer fence pair if present.
fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }

    let mut lines: Vec<&str> = text.lines().collect();
    lines.remove(0);
    if lines.last().map(|l| l.trim() == "```").unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences_plain_text_unchanged() {
        assert_eq!(strip_code_fences("def f():\n    pass"), "def f():\n    pass");
    }

    #[test]
    fn test_strip_code_fences_removes_outer_pair() {
        let fenced = "```python\ndef f():\n    pass\n```";
        assert_eq!(strip_code_fences(fenced), "def f():\n    pass");
    }

    #[test]
    fn test_strip_code_fences_unterminated() {
        let fenced = "```\ndef f():\n    pass";
        assert_eq!(strip_code_fences(fenced), "def f():\n    pass");
    }

    #[test]
    fn test_qa_prompt_embeds_context_and_question() {
        let prompt = qa_prompt("--- [1] a.py ---\ncode", "What does a.py do?");
        assert!(prompt.contains("--- [1] a.py ---\ncode"));
        assert!(prompt.contains("What does a.py do?"));
    }

    #[test]
    fn test_edit_prompt_embeds_file_and_instruction() {
        let prompt = edit_prompt("ctx", "old code", "src/x.py", "rename foo to bar");
        assert!(prompt.contains("File to modify: src/x.py"));
        assert!(prompt.contains("old code"));
        assert!(prompt.contains("rename foo to bar"));
    }

    #[test]
    fn test_resolve_provider_falls_back_to_default() {
        let config = LlmConfig::default();
        assert_eq!(resolve_provider("grok", &config), "grok");
        assert_eq!(resolve_provider("openai", &config), "gemini");
    }
}
