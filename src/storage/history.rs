//! 会話履歴ストア
//!
//! 直近 `max_rounds` 件の (ユーザー入力, アシスタント応答) ペアを保持し、
//! `~/.glm-cmd/history.json` に JSON 配列として永続化する。
//! 次回のリクエストでは過去の会話としてメッセージ列に差し込まれる。

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 1 往復分の会話。保存後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(rename = "user")]
    pub user_input: String,
    #[serde(rename = "assistant")]
    pub assistant_response: String,
}

/// リクエストに差し込むメッセージのロール
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// `to_request_messages()` が返すロール付きメッセージ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

/// 上限付き・時系列順の会話履歴。
///
/// 常に `len() <= max_rounds` を満たし、上限到達時の追加では最古の 1 件を捨てる (FIFO)。
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    max_rounds: usize,
}

impl ConversationHistory {
    /// 空の履歴を作成する。
    pub fn new(max_rounds: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_rounds),
            max_rounds,
        }
    }

    /// 履歴ファイルを読み込む。
    ///
    /// ファイルが存在しない・空・壊れている・配列でない場合はエラーにせず空の履歴を返す。
    /// `user` / `assistant` が文字列でないエントリはスキップし、
    /// 先頭から `max_rounds` 件だけを保持する。
    pub fn load(path: &Path, max_rounds: usize) -> Self {
        let mut history = Self::new(max_rounds);

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "History file not found, starting fresh");
                return history;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read history file");
                return history;
            }
        };

        if content.trim().is_empty() {
            return history;
        }

        let entries = match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(entries)) => entries,
            Ok(_) => {
                warn!(path = %path.display(), "History file is not a JSON array, ignoring");
                return history;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "History file is corrupted, ignoring");
                return history;
            }
        };

        for entry in entries {
            if history.turns.len() >= max_rounds {
                break;
            }
            match serde_json::from_value::<ConversationTurn>(entry) {
                Ok(turn) => history.turns.push_back(turn),
                Err(e) => debug!(error = %e, "Skipping malformed history entry"),
            }
        }

        info!(
            path = %path.display(),
            rounds = history.turns.len(),
            max_rounds,
            "Conversation history loaded"
        );
        history
    }

    /// 会話を 1 往復追加する。上限に達している場合は最古のエントリを先に捨てる。
    pub fn append(&mut self, user_input: &str, assistant_response: &str) {
        if self.max_rounds == 0 {
            return;
        }
        while self.turns.len() >= self.max_rounds {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn {
            user_input: user_input.to_string(),
            assistant_response: assistant_response.to_string(),
        });
    }

    /// 履歴全体を整形済み JSON で上書き保存する。親ディレクトリがなければ作成する。
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(&self.turns)
            .context("failed to serialize conversation history")?;
        fs::write(path, format!("{json}\n"))
            .with_context(|| format!("failed to write history file: {}", path.display()))?;

        debug!(path = %path.display(), rounds = self.turns.len(), "Conversation history saved");
        Ok(())
    }

    /// メモリ上の履歴を空にし、履歴ファイルを削除する。ファイルがなくてもエラーにしない。
    pub fn clear(&mut self, path: &Path) -> Result<()> {
        self.turns.clear();
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "History file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove history file: {}", path.display())),
        }
    }

    /// 各ターンを user → assistant の 2 メッセージに展開する（時系列順）。
    pub fn to_request_messages(&self) -> Vec<HistoryMessage<'_>> {
        self.turns
            .iter()
            .flat_map(|turn| {
                [
                    HistoryMessage {
                        role: Role::User,
                        content: turn.user_input.as_str(),
                    },
                    HistoryMessage {
                        role: Role::Assistant,
                        content: turn.assistant_response.as_str(),
                    },
                ]
            })
            .collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }
}
