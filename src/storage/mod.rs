pub mod history;

use std::path::PathBuf;

pub use history::{ConversationHistory, Role};

use crate::config::Config;

/// 履歴ファイルのパスを返す（`~/.glm-cmd/history.json`）。
pub fn history_path() -> PathBuf {
    Config::config_dir().join("history.json")
}
