//! AI モジュールの公開型定義

use async_openai::error::OpenAIError;
use thiserror::Error;

/// ストリーミングで受信したテキスト片の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// モデルが公開している思考過程（reasoning_content）
    Reasoning,
    /// 最終回答（content）
    Answer,
    /// ストリーム終了通知。テキストは常に空。
    Done,
}

/// ストリーミング中のテキスト片を受け取るシンク。
///
/// 空でない増分ごとに 1 回、到着順に呼ばれ、ストリーム終了時に `("", Done)` で 1 回だけ呼ばれる。
pub trait StreamSink {
    fn on_delta(&mut self, text: &str, kind: ContentKind);
}

impl<F> StreamSink for F
where
    F: FnMut(&str, ContentKind),
{
    fn on_delta(&mut self, text: &str, kind: ContentKind) {
        self(text, kind)
    }
}

/// API リクエストの失敗理由
#[derive(Debug, Error)]
pub enum ApiError {
    /// 接続失敗・タイムアウト・HTTP エラーなど
    #[error("transport error: {0}")]
    Transport(String),

    /// レスポンスの形式が不正、またはサーバーが error を返した
    #[error("API error: {0}")]
    Protocol(String),

    #[error("failed to build request: {0}")]
    Build(#[from] OpenAIError),

    /// Ctrl-C によりストリームが中断された
    #[error("request interrupted")]
    Interrupted,
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// 1 リクエスト分の結果。生成後は変更しない。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    /// モデルが返した回答テキスト全文
    pub raw_text: String,
    /// 思考過程（reasoning_content、または回答中の「思考過程」セクション）
    pub reasoning_text: Option<String>,
    /// 抽出したコマンド。見つからなければ None。
    pub command: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    /// Ctrl-C で中断された
    pub interrupted: bool,
}

impl ApiResponse {
    pub fn success(raw_text: String, reasoning_text: Option<String>, command: Option<String>) -> Self {
        Self {
            raw_text,
            reasoning_text,
            command,
            success: true,
            error: None,
            interrupted: false,
        }
    }

    /// 失敗結果。途中までに受信したテキストがあれば `raw_text` に残す。
    pub fn failure(error: &ApiError, raw_text: String) -> Self {
        Self {
            raw_text,
            reasoning_text: None,
            command: None,
            success: false,
            error: Some(error.to_string()),
            interrupted: matches!(error, ApiError::Interrupted),
        }
    }

    /// 履歴に保存するアシスタント応答を組み立てる。
    ///
    /// コマンドがない場合は None（履歴に記録しない）。
    pub fn history_entry(&self) -> Option<String> {
        let command = self.command.as_deref()?;
        match self.reasoning_text.as_deref() {
            Some(thinking) if !thinking.is_empty() => {
                Some(format!("{thinking}\n\nCommand: {command}"))
            }
            _ => Some(command.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_acts_as_sink() {
        let mut received = Vec::new();
        let mut sink = |text: &str, kind: ContentKind| received.push((text.to_string(), kind));
        sink.on_delta("ls", ContentKind::Answer);
        sink.on_delta("", ContentKind::Done);
        assert_eq!(
            received,
            vec![
                ("ls".to_string(), ContentKind::Answer),
                (String::new(), ContentKind::Done)
            ]
        );
    }

    #[test]
    fn history_entry_joins_thinking_and_command() {
        let response = ApiResponse::success(
            "raw".to_string(),
            Some("list files".to_string()),
            Some("ls -la".to_string()),
        );
        assert_eq!(
            response.history_entry().as_deref(),
            Some("list files\n\nCommand: ls -la")
        );
    }

    #[test]
    fn history_entry_without_thinking_is_command_only() {
        let response = ApiResponse::success("raw".to_string(), None, Some("pwd".to_string()));
        assert_eq!(response.history_entry().as_deref(), Some("pwd"));
    }

    #[test]
    fn history_entry_requires_command() {
        let response = ApiResponse::success("no fence".to_string(), None, None);
        assert!(response.history_entry().is_none());
    }

    #[test]
    fn failure_keeps_partial_text() {
        let response = ApiResponse::failure(&ApiError::Interrupted, "partial".to_string());
        assert!(!response.success);
        assert_eq!(response.raw_text, "partial");
        assert_eq!(response.error.as_deref(), Some("request interrupted"));
        assert!(response.interrupted);
    }
}
