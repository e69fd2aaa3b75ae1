//! 端末への表示
//!
//! バナー・思考過程・生成コマンド・各種メッセージの表示と、実行確認の入力を扱う。
//! ストリーミング中の逐次表示は `StreamPrinter` が担当する。

use std::io::{self, BufRead, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use termimad::MadSkin;

use crate::ai::{ContentKind, StreamSink};
use crate::storage::ConversationHistory;

use super::color::{bold_cyan, bold_green, cyan, dimmed, green, red, white, yellow};

const RULE: &str = "─────────────────────────────────────────────────────────";

pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}", cyan("╔══════════════════════════════════════════════════════════╗"));
    println!("{}", cyan("║                                                          ║"));
    println!("{}", cyan("║   GLM-CMD - Natural Language to Command Tool             ║"));
    println!("{}", cyan("║   Convert natural language to shell commands             ║"));
    println!("{}", cyan("║                                                          ║"));
    println!("{}", cyan("╚══════════════════════════════════════════════════════════╝"));
    println!("  {}", white(&format!("v{version}")));
    println!();
}

pub fn print_version() {
    println!("glm-cmd {}", env!("CARGO_PKG_VERSION"));
}

/// 思考過程を Markdown として整形表示する（非ストリーミング時）。
pub fn print_thinking(thinking: &str) {
    if thinking.trim().is_empty() {
        return;
    }
    println!("{}", bold_cyan("[Thinking Process]"));
    MadSkin::default().print_text(thinking);
    println!();
}

pub fn print_command(command: &str) {
    println!("{}", cyan(RULE));
    println!("{}", bold_green("[Generated Command]"));
    println!();
    println!("{}", yellow(command));
    println!();
    println!("{}", cyan(RULE));
}

pub fn print_error(message: &str) {
    eprintln!("{}", red(&format!("[Error] {message}")));
}

pub fn print_success(message: &str) {
    println!("{}", green(&format!("[Success] {message}")));
}

pub fn print_info(message: &str) {
    println!("{}", cyan(&format!("[Info] {message}")));
}

pub fn print_warning(message: &str) {
    println!("{}", yellow(&format!("[Warning] {message}")));
}

/// `[y/N]` 形式で確認を求める。`y` / `yes`（大文字小文字を問わない）のときだけ true。
pub fn ask_confirmation(prompt: &str) -> bool {
    print!("{} {}", yellow(prompt), white("[y/N]: "));
    let _ = io::stdout().flush();

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input).is_err() {
        return false;
    }
    is_yes(&input)
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// 会話履歴を古い順に表示する。
pub fn print_history(history: &ConversationHistory) {
    if history.is_empty() {
        print_info("No conversation history");
        return;
    }

    println!(
        "{}",
        bold_cyan(&format!(
            "Conversation History ({} / {} rounds)",
            history.len(),
            history.max_rounds()
        ))
    );
    for (i, turn) in history.turns().enumerate() {
        println!();
        println!("{}", cyan(&format!("── Round {} ──", i + 1)));
        println!("{} {}", green("User:"), turn.user_input);
        println!("{} {}", yellow("Assistant:"), turn.assistant_response);
    }
}

/// API 応答待ちのスピナーを生成・開始する。
fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Processing your request...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// ストリーミング中の増分を逐次表示するシンク。
///
/// 最初の増分が届くまではスピナーを出し、思考過程と回答それぞれの見出しは初回だけ表示する。
pub struct StreamPrinter {
    spinner: Option<ProgressBar>,
    reasoning_started: bool,
    answer_started: bool,
    finished: bool,
}

impl Default for StreamPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self {
            spinner: Some(spinner()),
            reasoning_started: false,
            answer_started: false,
            finished: false,
        }
    }

    /// 何か表示したかどうか
    pub fn has_output(&self) -> bool {
        self.reasoning_started || self.answer_started
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// 表示を締めくくる。中断時は末尾に `[interrupted]` を付ける。何度呼んでもよい。
    pub fn finish(&mut self, interrupted: bool) {
        self.clear_spinner();
        if self.finished {
            return;
        }
        self.finished = true;
        if self.has_output() {
            if interrupted {
                print!("{}", red(" [interrupted]"));
            }
            println!();
            println!();
        }
        let _ = io::stdout().flush();
    }
}

impl StreamSink for StreamPrinter {
    fn on_delta(&mut self, text: &str, kind: ContentKind) {
        match kind {
            ContentKind::Reasoning => {
                self.clear_spinner();
                if !self.reasoning_started {
                    println!("{}", bold_cyan("[Thinking Process]"));
                    self.reasoning_started = true;
                }
                print!("{}", dimmed(text));
            }
            ContentKind::Answer => {
                self.clear_spinner();
                if !self.answer_started {
                    if self.reasoning_started {
                        println!();
                        println!();
                    }
                    println!("{}", bold_green("[Response]"));
                    self.answer_started = true;
                }
                print!("{}", white(text));
            }
            ContentKind::Done => self.finish(false),
        }
        let _ = io::stdout().flush();
    }
}

impl Drop for StreamPrinter {
    fn drop(&mut self) {
        self.clear_spinner();
    }
}
