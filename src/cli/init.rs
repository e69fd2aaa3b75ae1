//! 対話形式の設定ウィザード（`--init`）
//!
//! API キー・エンドポイント・モデルなどを順に尋ね、`~/.glm-cmd/config.toml` を書き出す。

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::{mask_api_key, Config, DEFAULT_MODEL, ENDPOINT_CODING, ENDPOINT_STANDARD};

use super::color::cyan;
use super::ui::{ask_confirmation, print_info, print_success, print_warning};

const STEP_RULE: &str = "─────────────────────────────────────────";

/// ウィザードを実行する。キャンセルされた場合は `Ok(false)`。
pub fn run(path: &Path) -> Result<bool> {
    if path.exists() {
        print_warning("Configuration file already exists");
        println!("Location: {}", path.display());
        if !ask_confirmation("Do you want to overwrite it?") {
            print_info("Initialization cancelled");
            return Ok(false);
        }
    }

    let stdin = io::stdin();
    let config = prompt_config(&mut stdin.lock())?;

    println!();
    println!("{}", config.summary());
    println!();
    if !ask_confirmation("Save this configuration?") {
        print_info("Initialization cancelled");
        return Ok(false);
    }

    config.write_to(path)?;
    info!(path = %path.display(), "Configuration initialized by wizard");

    println!();
    print_success("Configuration initialized successfully!");
    println!();
    println!("Configuration file created at:\n  {}", path.display());
    println!();
    println!("You can now use glm-cmd directly:\n  glm-cmd \"your command description\"");
    Ok(true)
}

/// 入力を順に読み、設定を組み立てる。
fn prompt_config<R: BufRead>(input: &mut R) -> Result<Config> {
    println!();
    println!("{}", cyan("╔══════════════════════════════════════════════════════════╗"));
    println!("{}", cyan("║  GLM-CMD Configuration Wizard                            ║"));
    println!("{}", cyan("╚══════════════════════════════════════════════════════════╝"));
    println!();

    step("Step 1/6: API Key", "Get your API key from: https://bigmodel.cn");
    let api_key = ask_until(input, "Enter your API Key: ", |s| {
        (!s.is_empty()).then(|| s.to_string())
    })?;

    step(
        "Step 2/6: API Endpoint",
        &format!(
            "  1. Coding endpoint   {ENDPOINT_CODING}\n  2. Standard endpoint {ENDPOINT_STANDARD}\n  3. Custom URL"
        ),
    );
    let choice = ask_until(
        input,
        "Choose endpoint [1/2/3] (default: 1): ",
        parse_endpoint_choice,
    )?;
    let endpoint = match choice {
        EndpointChoice::Known(url) => url.to_string(),
        EndpointChoice::Custom => ask_until(input, "Enter custom endpoint URL: ", |s| {
            (!s.is_empty()).then(|| s.to_string())
        })?,
    };
    println!("Using: {endpoint}");

    step(
        "Step 3/6: Model Name",
        "Common models: glm-4.7, glm-4-plus, glm-4-flash, glm-4-air",
    );
    let model = ask_until(
        input,
        &format!("Enter model name (default: {DEFAULT_MODEL}): "),
        |s| Some((if s.is_empty() { DEFAULT_MODEL } else { s }).to_string()),
    )?;

    step(
        "Step 4/6: Temperature",
        "Lower is more deterministic, higher is more creative.",
    );
    let temperature = ask_until(
        input,
        "Enter temperature [0.0-2.0] (default: 0.7): ",
        parse_temperature,
    )?;

    step("Step 5/6: Max Tokens", "Maximum number of tokens in the response.");
    let max_tokens = ask_until(input, "Enter max tokens (default: 2048): ", parse_max_tokens)?;

    step("Step 6/6: Request Timeout", "Request timeout in seconds.");
    let timeout = ask_until(input, "Enter timeout in seconds (default: 30): ", parse_timeout)?;

    step(
        "User Custom Prompt",
        "Prefixed to every request, e.g. \"Use safe options only\".",
    );
    let user_prompt = read_line(input, "Enter your custom prompt (optional, press Enter to skip): ")?;

    let config = Config {
        api_key: Some(api_key),
        endpoint: Some(endpoint),
        model,
        user_prompt: (!user_prompt.is_empty()).then_some(user_prompt),
        temperature,
        max_tokens,
        timeout,
        ..Config::default()
    };
    if let Some(key) = config.api_key.as_deref() {
        println!("API Key: {}", mask_api_key(key));
    }
    Ok(config)
}

fn step(title: &str, hint: &str) {
    println!();
    println!("{title}");
    println!("{STEP_RULE}");
    println!("{hint}");
    println!();
}

/// 1 行読み、前後の空白を除いて返す。EOF はエラー。
fn read_line<R: BufRead>(input: &mut R, prompt: &str) -> Result<String> {
    print!("{prompt}");
    let _ = io::stdout().flush();

    let mut line = String::new();
    let n = input.read_line(&mut line).context("failed to read input")?;
    if n == 0 {
        bail!("input closed before the configuration was complete");
    }
    Ok(line.trim().to_string())
}

/// 受け入れられる値が入力されるまで繰り返し尋ねる。
fn ask_until<R, T, F>(input: &mut R, prompt: &str, parse: F) -> Result<T>
where
    R: BufRead,
    F: Fn(&str) -> Option<T>,
{
    loop {
        let line = read_line(input, prompt)?;
        match parse(&line) {
            Some(value) => return Ok(value),
            None => print_warning("Invalid value. Please try again."),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum EndpointChoice {
    Known(&'static str),
    Custom,
}

fn parse_endpoint_choice(input: &str) -> Option<EndpointChoice> {
    match input {
        "" | "1" => Some(EndpointChoice::Known(ENDPOINT_CODING)),
        "2" => Some(EndpointChoice::Known(ENDPOINT_STANDARD)),
        "3" => Some(EndpointChoice::Custom),
        _ => None,
    }
}

fn parse_temperature(input: &str) -> Option<f32> {
    if input.is_empty() {
        return Some(0.7);
    }
    input
        .parse::<f32>()
        .ok()
        .filter(|t| (0.0..=2.0).contains(t))
}

fn parse_max_tokens(input: &str) -> Option<u32> {
    if input.is_empty() {
        return Some(2048);
    }
    input.parse::<u32>().ok().filter(|n| (1..=32768).contains(n))
}

fn parse_timeout(input: &str) -> Option<u64> {
    if input.is_empty() {
        return Some(30);
    }
    input.parse::<u64>().ok().filter(|n| (1..=300).contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn endpoint_choice_defaults_to_coding() {
        assert_eq!(
            parse_endpoint_choice(""),
            Some(EndpointChoice::Known(ENDPOINT_CODING))
        );
        assert_eq!(
            parse_endpoint_choice("2"),
            Some(EndpointChoice::Known(ENDPOINT_STANDARD))
        );
        assert_eq!(parse_endpoint_choice("3"), Some(EndpointChoice::Custom));
        assert_eq!(parse_endpoint_choice("4"), None);
    }

    #[test]
    fn numeric_inputs_are_range_checked() {
        assert_eq!(parse_temperature(""), Some(0.7));
        assert_eq!(parse_temperature("1.5"), Some(1.5));
        assert_eq!(parse_temperature("2.5"), None);
        assert_eq!(parse_max_tokens("0"), None);
        assert_eq!(parse_max_tokens("4096"), Some(4096));
        assert_eq!(parse_timeout("301"), None);
        assert_eq!(parse_timeout(""), Some(30));
    }

    #[test]
    fn wizard_collects_answers_and_retries_invalid_ones() {
        let answers = [
            "",                    // 空の API キーは再入力
            "sk-abcdefghijkl",
            "9",                   // 不正な選択肢
            "3",
            "http://localhost:8080/v4",
            "",                    // デフォルトモデル
            "0.2",
            "abc",                 // 不正な数値
            "1024",
            "",
            "Use safe options only",
        ]
        .join("\n")
            + "\n";

        let config = prompt_config(&mut Cursor::new(answers)).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-abcdefghijkl"));
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:8080/v4"));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.user_prompt.as_deref(), Some("Use safe options only"));
    }

    #[test]
    fn wizard_fails_on_early_eof() {
        assert!(prompt_config(&mut Cursor::new("sk-key\n")).is_err());
    }
}
