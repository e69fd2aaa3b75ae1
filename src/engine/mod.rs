//! 生成されたコマンドの実行
//!
//! コマンド文字列は `sh -c` にそのまま渡す（パイプやリダイレクトを含むため自前で解釈しない）。
//! 標準入出力は端末を継承する。

use std::process::{Command, ExitStatus};

use anyhow::{Context, Result};
use tracing::{debug, info};

const SHELL: &str = "sh";

/// コマンド実行の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    /// 終了コード (0 = 成功)。シグナルで終了した場合は 128 + シグナル番号
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// コマンドを実行し、終了を待つ。起動できなかった場合のみエラー。
pub fn execute(command: &str) -> Result<CommandResult> {
    debug!(command = %command, "Spawning command");

    let status = Command::new(SHELL)
        .arg("-c")
        .arg(command)
        .status()
        .with_context(|| format!("failed to spawn {SHELL} for command: {command}"))?;

    let exit_code = exit_code(status);
    info!(command = %command, exit_code, "Command finished");
    Ok(CommandResult { exit_code })
}

fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}
