//! リクエストペイロードの組み立て
//!
//! システムプロンプト + 会話履歴 + 今回の入力を 1 つのチャットリクエストにまとめる。
//! I/O は行わない純粋な関数。

use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use tracing::debug;

use crate::config::Config;
use crate::storage::{ConversationHistory, Role};

use super::prompts::{SYSTEM_PROMPT, USER_PROMPT_SEPARATOR};
use super::types::ApiError;

/// システムプロンプトを組み立てる。システム情報があれば先頭に置く。
pub fn build_system_prompt(system_context: Option<&str>) -> String {
    format!("{}\n{SYSTEM_PROMPT}", system_context.unwrap_or_default())
}

/// ユーザーメッセージ本文を組み立てる。カスタムプロンプトがあれば `"{prompt}: {input}"` とする。
pub fn build_user_content(user_prompt: Option<&str>, user_input: &str) -> String {
    match user_prompt {
        Some(prompt) if !prompt.is_empty() => {
            format!("{prompt}{USER_PROMPT_SEPARATOR}{user_input}")
        }
        _ => user_input.to_string(),
    }
}

/// チャットリクエストを組み立てる。
///
/// `stream` は `stream` フィールドの値だけを切り替え、メッセージ構成は変わらない。
pub fn build_request(
    config: &Config,
    system_context: Option<&str>,
    history: Option<&ConversationHistory>,
    user_input: &str,
    stream: bool,
) -> Result<CreateChatCompletionRequest, ApiError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(build_system_prompt(system_context))
            .build()?
            .into(),
    );

    if let Some(history) = history {
        for message in history.to_request_messages() {
            let message: ChatCompletionRequestMessage = match message.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.to_string())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.to_string())
                    .build()?
                    .into(),
            };
            messages.push(message);
        }
    }

    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(build_user_content(config.user_prompt.as_deref(), user_input))
            .build()?
            .into(),
    );

    debug!(
        model = %config.model,
        message_count = messages.len(),
        history_rounds = history.map(ConversationHistory::len).unwrap_or(0),
        stream,
        "Chat request assembled"
    );

    let request = CreateChatCompletionRequestArgs::default()
        .model(config.model.clone())
        .messages(messages)
        .temperature(config.temperature)
        .max_tokens(config.max_tokens)
        .stream(stream)
        .build()?;

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn config() -> Config {
        Config {
            api_key: Some("test-key".to_string()),
            endpoint: Some("https://example.invalid/v4".to_string()),
            ..Config::default()
        }
    }

    fn to_json(request: &CreateChatCompletionRequest) -> Value {
        serde_json::to_value(request).unwrap()
    }

    #[test]
    fn minimal_request_has_system_and_user_messages() {
        let request = build_request(&config(), None, None, "list files", false).unwrap();
        let json = to_json(&request);

        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"].as_str().unwrap().contains("**命令：**"));
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "list files");
        assert_eq!(json["model"], "glm-4.7");
        assert_eq!(json["max_tokens"], 2048);
        assert_eq!(json["stream"], false);
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn history_is_spliced_between_system_and_current_turn() {
        let mut history = ConversationHistory::new(5);
        history.append("q1", "a1");
        history.append("q2", "a2");

        let request = build_request(&config(), None, Some(&history), "q3", true).unwrap();
        let json = to_json(&request);
        let roles: Vec<_> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| (m["role"].as_str().unwrap().to_string(), m["content"].clone()))
            .collect();

        assert_eq!(roles.len(), 6);
        assert_eq!(roles[1], ("user".to_string(), Value::from("q1")));
        assert_eq!(roles[2], ("assistant".to_string(), Value::from("a1")));
        assert_eq!(roles[3], ("user".to_string(), Value::from("q2")));
        assert_eq!(roles[4], ("assistant".to_string(), Value::from("a2")));
        assert_eq!(roles[5], ("user".to_string(), Value::from("q3")));
    }

    #[test]
    fn stream_flag_only_changes_stream_field() {
        let plain = to_json(&build_request(&config(), Some("ctx"), None, "x", false).unwrap());
        let streamed = to_json(&build_request(&config(), Some("ctx"), None, "x", true).unwrap());

        assert_eq!(plain["messages"], streamed["messages"]);
        assert_eq!(plain["stream"], false);
        assert_eq!(streamed["stream"], true);
    }

    #[test]
    fn custom_user_prompt_is_prefixed() {
        let mut config = config();
        config.user_prompt = Some("Use safe options only".to_string());

        let json = to_json(&build_request(&config, None, None, "delete logs", false).unwrap());
        assert_eq!(
            json["messages"][1]["content"],
            "Use safe options only: delete logs"
        );
    }

    #[test]
    fn empty_user_prompt_is_ignored() {
        assert_eq!(build_user_content(Some(""), "ls"), "ls");
        assert_eq!(build_user_content(None, "ls"), "ls");
    }

    #[test]
    fn system_context_precedes_base_prompt() {
        let prompt = build_system_prompt(Some("## System Context\n- Operating System: Linux\n"));
        assert!(prompt.starts_with("## System Context"));
        assert!(prompt.ends_with(SYSTEM_PROMPT));

        let bare = build_system_prompt(None);
        assert_eq!(bare, format!("\n{SYSTEM_PROMPT}"));
    }
}
