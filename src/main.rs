mod ai;
mod cli;
mod config;
mod engine;
mod logging;
mod storage;
mod system_info;

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

use ai::{build_request, ApiResponse, GlmClient};
use cli::ui::{
    ask_confirmation, print_banner, print_command, print_error, print_history, print_info,
    print_success, print_thinking, print_version, print_warning, StreamPrinter,
};
use cli::Cli;
use config::Config;
use storage::{history_path, ConversationHistory};
use system_info::SystemInfo;

/// Ctrl-C で終了したときの終了コード（128 + SIGINT）
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // .env ファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // ログシステムの初期化（_guard は main 終了まで保持する必要がある）
    let _guard = logging::init_logging(cli.verbose);
    info!("glm-cmd started");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            warn!(error = %e, "glm-cmd failed");
            print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if cli.show_version {
        print_version();
        return Ok(ExitCode::SUCCESS);
    }

    if cli.init {
        let saved = cli::init::run(&Config::config_path())?;
        return Ok(init_exit_code(saved));
    }

    let mut config = Config::load();
    if cli.verbose {
        config.verbose = true;
    }
    if cli.no_stream {
        config.stream = false;
    }

    let history_file = history_path();

    if cli.clear_history {
        ConversationHistory::new(config.memory_rounds)
            .clear(&history_file)
            .context("failed to clear conversation history")?;
        print_success("Conversation history cleared");
        return Ok(ExitCode::SUCCESS);
    }

    if cli.history {
        print_history(&ConversationHistory::load(&history_file, config.memory_rounds));
        return Ok(ExitCode::SUCCESS);
    }

    let system_info = SystemInfo::detect();

    if cli.info {
        print_banner();
        system_info.print();
        println!();
        println!("{}", config.summary());
        return Ok(ExitCode::SUCCESS);
    }

    config.validate()?;

    let user_input = match cli.query_text() {
        Some(query) => query,
        None => read_query_from_stdin()?,
    };
    if user_input.is_empty() {
        print_error("No input provided");
        return Ok(ExitCode::FAILURE);
    }

    if config.verbose {
        println!("\n=== Input ===\n{user_input}\n=============\n");
    }

    let mut history = config
        .memory_enabled
        .then(|| ConversationHistory::load(&history_file, config.memory_rounds));
    if config.verbose {
        if let Some(ref history) = history {
            print_info(&format!("Conversation history: {} rounds", history.len()));
        }
    }

    let response = request_command(&config, &system_info, history.as_ref(), &user_input).await?;

    if !response.success {
        print_error(response.error.as_deref().unwrap_or("Failed to get response from API"));
        return Ok(ExitCode::FAILURE);
    }

    if let (Some(history), Some(entry)) = (history.as_mut(), response.history_entry()) {
        history.append(&user_input, &entry);
        if let Err(e) = history.save(&history_file) {
            warn!(error = %e, "Failed to save conversation history");
            print_warning(&format!("failed to save conversation history: {e:#}"));
        }
    }

    if !config.stream {
        if let Some(thinking) = response.reasoning_text.as_deref() {
            print_thinking(thinking);
        }
    }

    let Some(command) = response.command.as_deref() else {
        print_error("Failed to extract command from response");
        if config.verbose {
            println!("\nRaw response:\n{}", response.raw_text);
        }
        return Ok(ExitCode::FAILURE);
    };

    print_command(command);
    println!();

    if !cli.yes && !ask_confirmation("Do you want to execute this command?") {
        print_info("Command execution cancelled");
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    let result = engine::execute(command)?;
    println!();
    if result.success() {
        print_success("Command executed successfully");
    } else {
        print_warning(&format!("Command exited with code: {}", result.exit_code));
    }

    Ok(ExitCode::SUCCESS)
}

/// リクエストを組み立てて送信する。ストリーミング時は増分を逐次表示する。
async fn request_command(
    config: &Config,
    system_info: &SystemInfo,
    history: Option<&ConversationHistory>,
    user_input: &str,
) -> Result<ApiResponse> {
    let request = build_request(
        config,
        Some(&system_info.to_prompt()),
        history,
        user_input,
        config.stream,
    )?;

    if config.verbose {
        let body = serde_json::to_string_pretty(&request).context("failed to serialize request")?;
        println!("\n=== Request ===\n{body}\n===============\n");
    }

    let client = GlmClient::new(config)?;

    let response = if config.stream {
        let mut printer = StreamPrinter::new();
        let response = client.send_stream(&request, &mut printer).await;
        printer.finish(response.interrupted);
        // ストリーミング中に登録した SIGINT ハンドラは残るため、以降の Ctrl-C は明示的に終了させる
        if let Err(e) = spawn_interrupt_watch(exit_on_interrupt) {
            warn!(error = %e, "Failed to watch for Ctrl-C after streaming");
        }
        response
    } else {
        print_info("Processing your request...");
        client.send(&request).await
    };

    debug!(
        success = response.success,
        has_command = response.command.is_some(),
        raw_len = response.raw_text.len(),
        "Response received"
    );

    if config.verbose && !config.stream {
        println!("\n=== Response ===\n{}\n================\n", response.raw_text);
    }

    Ok(response)
}

/// `--init` の結果を終了コードにする。キャンセルは失敗扱い。
fn init_exit_code(saved: bool) -> ExitCode {
    if saved {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// SIGINT を受けたら `on_interrupt` を呼ぶタスクを起動する。ハンドラは呼び出し時点で登録される。
fn spawn_interrupt_watch<F>(on_interrupt: F) -> io::Result<tokio::task::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(tokio::spawn(async move {
        if sigint.recv().await.is_some() {
            on_interrupt();
        }
    }))
}

fn exit_on_interrupt() {
    info!("Ctrl-C received after streaming, exiting");
    println!();
    print_info("Interrupted");
    std::process::exit(INTERRUPTED_EXIT_CODE);
}

/// 引数がない場合は標準入力から EOF まで読み、末尾の改行を取り除く。
fn read_query_from_stdin() -> Result<String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        print_banner();
        print_info("Enter your command description (Ctrl+D to finish):");
    }

    let mut input = String::new();
    stdin
        .read_to_string(&mut input)
        .context("failed to read query from stdin")?;
    Ok(trim_trailing_newlines(&input).to_string())
}

fn trim_trailing_newlines(input: &str) -> &str {
    input.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    fn trailing_newlines_are_trimmed() {
        assert_eq!(trim_trailing_newlines("list files\r\n\n"), "list files");
        assert_eq!(trim_trailing_newlines("  keep spaces  \n"), "  keep spaces  ");
        assert_eq!(trim_trailing_newlines("\n\n"), "");
    }

    #[test]
    fn cancelled_init_exits_with_failure() {
        let debug = |code: ExitCode| format!("{code:?}");
        assert_eq!(debug(init_exit_code(false)), debug(ExitCode::FAILURE));
        assert_eq!(debug(init_exit_code(true)), debug(ExitCode::SUCCESS));
    }

    #[tokio::test]
    #[serial]
    async fn interrupt_watch_fires_on_sigint() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = spawn_interrupt_watch(move || {
            let _ = tx.send(());
        })
        .unwrap();

        // ハンドラ登録済みなので、自プロセスへの SIGINT でテストは終了しない
        let status = std::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("SIGINT was not observed")
            .unwrap();
        handle.await.unwrap();
    }
}
