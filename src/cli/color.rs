//! 端末出力の色付けヘルパー
//!
//! 役割ごとに色を決めておき、呼び出し側は意味で選ぶ。

use nu_ansi_term::{Color, Style};

fn paint(style: Style, text: &str) -> String {
    style.paint(text).to_string()
}

/// エラー
pub fn red(text: &str) -> String {
    paint(Style::new().fg(Color::LightRed), text)
}

/// 成功・生成されたコマンド
pub fn green(text: &str) -> String {
    paint(Style::new().fg(Color::LightGreen), text)
}

/// 警告・確認プロンプト
pub fn yellow(text: &str) -> String {
    paint(Style::new().fg(Color::Yellow), text)
}

/// 見出し・情報
pub fn cyan(text: &str) -> String {
    paint(Style::new().fg(Color::Cyan), text)
}

pub fn white(text: &str) -> String {
    paint(Style::new().fg(Color::LightGray), text)
}

/// 思考過程のストリーミング表示
pub fn dimmed(text: &str) -> String {
    paint(Style::new().fg(Color::DarkGray).italic(), text)
}

pub fn bold_cyan(text: &str) -> String {
    paint(Color::Cyan.bold(), text)
}

pub fn bold_green(text: &str) -> String {
    paint(Color::LightGreen.bold(), text)
}
