//! 設定ファイル管理
//!
//! `~/.glm-cmd/config.toml` から TOML 形式の設定を読み込み、
//! `GLM_CMD_*` 環境変数で上書きする（優先度: 環境変数 > 設定ファイル > デフォルト値）。
//!
//! # 設定ファイル例
//!
//! ```toml
//! api_key = "your-api-key"
//! endpoint = "https://open.bigmodel.cn/api/coding/paas/v4"
//! model = "glm-4.7"
//! user_prompt = "Use safe options only"
//! temperature = 0.7
//! max_tokens = 2048
//! timeout = 30
//! memory_enabled = true
//! memory_rounds = 5
//! stream = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_MODEL: &str = "glm-4.7";
pub const ENDPOINT_CODING: &str = "https://open.bigmodel.cn/api/coding/paas/v4";
pub const ENDPOINT_STANDARD: &str = "https://open.bigmodel.cn/api/paas/v4";

/// glm-cmd の設定全体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API キー（Bearer トークン）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// `/chat/completions` を除いた API エンドポイント
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub model: String,
    /// 毎回ユーザー入力の前に付与するカスタムプロンプト
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// リクエストのタイムアウト（秒）
    pub timeout: u64,
    /// 会話履歴を使うかどうか
    pub memory_enabled: bool,
    /// 保持する会話の往復数
    pub memory_rounds: usize,
    /// ストリーミングで受信するかどうか
    pub stream: bool,
    #[serde(skip_serializing)]
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            model: DEFAULT_MODEL.to_string(),
            user_prompt: None,
            temperature: 0.7,
            max_tokens: 2048,
            timeout: 30,
            memory_enabled: true,
            memory_rounds: 5,
            stream: true,
            verbose: false,
        }
    }
}

impl Config {
    /// 設定ファイルと環境変数から設定を読み込む。検証は行わない（`validate()` を参照）。
    pub fn load() -> Self {
        let path = Self::config_path();
        let mut config = Self::load_from(&path);
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// 指定パスの設定ファイルを読み込む。
    ///
    /// ファイルが存在しなければテンプレートを生成してデフォルト値を返す。
    /// 読み込み・パースに失敗した場合は警告を表示してデフォルト値を返す。
    pub fn load_from(path: &Path) -> Self {
        debug!(path = %path.display(), "Loading config file");

        if !path.exists() {
            Self::create_default_config(path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        model = %config.model,
                        stream = config.stream,
                        memory_rounds = config.memory_rounds,
                        "Config loaded successfully"
                    );
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    eprintln!("glm-cmd: warning: failed to parse config file: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file");
                eprintln!("glm-cmd: warning: failed to read config file: {e}");
                Self::default()
            }
        }
    }

    /// `GLM_CMD_*` 環境変数で設定を上書きする。空文字列の変数は無視する。
    ///
    /// 数値として解釈できない値は警告を出して無視する。
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("GLM_CMD_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = get("GLM_CMD_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("GLM_CMD_ENDPOINT") {
            self.endpoint = Some(v);
        }
        if let Some(v) = get("GLM_CMD_USER_PROMPT") {
            self.user_prompt = Some(v);
        }
        if let Some(v) = get("GLM_CMD_TEMP") {
            parse_into(&mut self.temperature, "GLM_CMD_TEMP", &v);
        }
        if let Some(v) = get("GLM_CMD_MAX_TOKENS") {
            parse_into(&mut self.max_tokens, "GLM_CMD_MAX_TOKENS", &v);
        }
        if let Some(v) = get("GLM_CMD_TIMEOUT") {
            parse_into(&mut self.timeout, "GLM_CMD_TIMEOUT", &v);
        }
        if let Some(v) = get("GLM_CMD_STREAM") {
            self.stream = is_truthy(&v);
        }
        if let Some(v) = get("GLM_CMD_VERBOSE") {
            self.verbose = is_truthy(&v);
        }
    }

    /// API 呼び出しに必須の項目を検証する。
    pub fn validate(&self) -> Result<()> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            bail!(
                "API key not configured. Set GLM_CMD_API_KEY or add `api_key` to {}\n\
                 (run `glm-cmd --init` to create the config interactively)",
                Self::config_path().display()
            );
        }
        if self.endpoint.as_deref().map_or(true, str::is_empty) {
            bail!(
                "API endpoint not configured. Set GLM_CMD_ENDPOINT or add `endpoint` to {}\n\n\
                 Available endpoints:\n  - Coding endpoint:   {ENDPOINT_CODING}\n  - Standard endpoint: {ENDPOINT_STANDARD}",
                Self::config_path().display()
            );
        }
        Ok(())
    }

    /// 表示用の設定サマリー。API キーは先頭と末尾 4 文字以外を伏せる。
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Configuration:".to_string(),
            format!("  Model: {}", self.model),
            format!(
                "  Endpoint: {}",
                self.endpoint.as_deref().unwrap_or("(not set)")
            ),
            format!("  Temperature: {:.1}", self.temperature),
            format!("  Max Tokens: {}", self.max_tokens),
            format!("  Timeout: {} seconds", self.timeout),
            format!("  Streaming: {}", self.stream),
            format!(
                "  Memory: {} ({} rounds)",
                if self.memory_enabled { "enabled" } else { "disabled" },
                self.memory_rounds
            ),
        ];
        if let Some(prompt) = self.user_prompt.as_deref() {
            lines.push(format!("  User Prompt: {prompt}"));
        }
        if let Some(key) = self.api_key.as_deref() {
            lines.push(format!("  API Key: {}", mask_api_key(key)));
        }
        lines.join("\n")
    }

    /// TOML として書き出す（`--init` ウィザード用）。
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        info!(path = %path.display(), "Config file written");
        Ok(())
    }

    /// 設定ディレクトリ（`~/.glm-cmd`）を返す。
    ///
    /// ホームディレクトリが取得できない場合は `./.glm-cmd` にフォールバックする。
    pub fn config_dir() -> PathBuf {
        BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".glm-cmd")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// 設定ファイルが存在しない場合にテンプレートから生成する。
    ///
    /// 生成に失敗しても警告を表示するだけで処理は継続する。
    fn create_default_config(path: &Path) {
        const TEMPLATE: &str = r#"# glm-cmd configuration
#
# Environment variables (GLM_CMD_API_KEY, GLM_CMD_ENDPOINT, ...) take precedence.

# api_key = "your-api-key"
# endpoint = "https://open.bigmodel.cn/api/coding/paas/v4"
# model = "glm-4.7"
# user_prompt = "Use safe options only"
# temperature = 0.7
# max_tokens = 2048
# timeout = 30
# memory_enabled = true
# memory_rounds = 5
# stream = true
"#;

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Failed to create config directory");
                eprintln!("glm-cmd: warning: failed to create config directory: {e}");
                return;
            }
        }

        match std::fs::write(path, TEMPLATE) {
            Ok(()) => {
                info!(path = %path.display(), "Created default config file");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to create default config file");
                eprintln!("glm-cmd: warning: failed to create config file: {e}");
            }
        }
    }
}

/// API キーを `abcd***wxyz` 形式に伏せる。8 文字以下は `***`。
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}***{tail}")
    } else {
        "***".to_string()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_into<T: std::str::FromStr>(target: &mut T, key: &str, value: &str) {
    match value.parse::<T>() {
        Ok(parsed) => *target = parsed,
        Err(_) => {
            warn!(key, value, "Ignoring invalid numeric environment value");
            eprintln!("glm-cmd: warning: ignoring invalid value for {key}: {value}");
        }
    }
}
