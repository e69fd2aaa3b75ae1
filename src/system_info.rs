//! 実行環境の情報収集
//!
//! OS・アーキテクチャ・シェルを調べ、システムプロンプトの先頭に付けるコンテキストを作る。
//! 環境に合ったコマンド（`ls` のオプション差など）を生成させるために使う。

use std::path::Path;

use sysinfo::System;
use tracing::debug;

use crate::cli::color::{cyan, white};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub os_name: String,
    pub os_version: String,
    pub arch: String,
    pub shell_name: String,
    pub hostname: String,
}

impl SystemInfo {
    /// 現在の環境から情報を集める。取得できない項目は `unknown` にする。
    pub fn detect() -> Self {
        let info = Self {
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::long_os_version()
                .or_else(System::os_version)
                .unwrap_or_else(|| "unknown".to_string()),
            arch: std::env::consts::ARCH.to_string(),
            shell_name: shell_name(std::env::var("SHELL").ok().as_deref()),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        };
        debug!(?info, "System info detected");
        info
    }

    /// システムプロンプトに埋め込むコンテキストブロック
    pub fn to_prompt(&self) -> String {
        format!(
            "## System Context\n\
             - Operating System: {} ({})\n\
             - Architecture: {}\n\
             - Shell: {}\n\
             - Hostname: {}\n\
             Generate commands that are compatible with this environment.\n",
            self.os_name, self.os_version, self.arch, self.shell_name, self.hostname
        )
    }

    /// `--info` 用の表示
    pub fn print(&self) {
        println!("{}", cyan("System Information:"));
        for (label, value) in [
            ("OS", format!("{} ({})", self.os_name, self.os_version)),
            ("Architecture", self.arch.clone()),
            ("Shell", self.shell_name.clone()),
            ("Hostname", self.hostname.clone()),
        ] {
            println!("  {label}: {}", white(&value));
        }
    }
}

/// `$SHELL` のパスからシェル名を取り出す。未設定なら `sh`。
fn shell_name(shell: Option<&str>) -> String {
    shell
        .filter(|s| !s.is_empty())
        .and_then(|s| Path::new(s).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sh".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SystemInfo {
        SystemInfo {
            os_name: "Ubuntu".to_string(),
            os_version: "Linux 24.04 Ubuntu".to_string(),
            arch: "x86_64".to_string(),
            shell_name: "zsh".to_string(),
            hostname: "devbox".to_string(),
        }
    }

    #[test]
    fn shell_name_from_path() {
        assert_eq!(shell_name(Some("/usr/bin/zsh")), "zsh");
        assert_eq!(shell_name(Some("/bin/bash")), "bash");
        assert_eq!(shell_name(Some("")), "sh");
        assert_eq!(shell_name(None), "sh");
    }

    #[test]
    fn prompt_block_lists_environment() {
        let prompt = sample().to_prompt();
        assert!(prompt.starts_with("## System Context\n"));
        assert!(prompt.contains("- Operating System: Ubuntu (Linux 24.04 Ubuntu)\n"));
        assert!(prompt.contains("- Architecture: x86_64\n"));
        assert!(prompt.contains("- Shell: zsh\n"));
        assert!(prompt.ends_with('\n'));
    }

    #[test]
    fn detect_fills_architecture() {
        let info = SystemInfo::detect();
        assert_eq!(info.arch, std::env::consts::ARCH);
        assert!(!info.shell_name.is_empty());
    }
}
