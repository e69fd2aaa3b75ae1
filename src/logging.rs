//! ログ初期化モジュール
//!
//! `tracing` + `tracing-subscriber` でログをファイルに出力する。
//! 端末には何も出さない（コマンドの表示を汚さないため）。
//! ログファイルは `~/.glm-cmd/logs/` にローカル日付で日次ローテーションされる。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

const LOG_PREFIX: &str = "glm-cmd.log";
const LOG_ENV: &str = "GLM_CMD_LOG";

/// ログ行のタイムスタンプをローカル時刻（オフセット付き）で出力するタイマー
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// ローカル日付で日次ローテーションするファイルアペンダー。
///
/// 書き込みのたびに日付を確認し、変わっていれば新しいファイルを開く。
struct DailyAppender {
    dir: PathBuf,
    current_date: NaiveDate,
    file: File,
}

impl DailyAppender {
    fn new(dir: PathBuf) -> std::io::Result<Self> {
        let today = Local::now().date_naive();
        let file = Self::open_log_file(&dir, today)?;
        Ok(Self {
            dir,
            current_date: today,
            file,
        })
    }

    fn open_log_file(dir: &Path, date: NaiveDate) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(log_file_name(date)))
    }
}

impl Write for DailyAppender {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let today = Local::now().date_naive();
        if today != self.current_date {
            self.file = Self::open_log_file(&self.dir, today)?;
            self.current_date = today;
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn log_file_name(date: NaiveDate) -> String {
    format!("{LOG_PREFIX}.{}", date.format("%Y-%m-%d"))
}

pub fn log_dir() -> PathBuf {
    Config::config_dir().join("logs")
}

/// ログシステムを初期化する。
///
/// - ログレベルは `GLM_CMD_LOG` 環境変数で制御（デフォルト: `info`、`verbose` 時は `debug`）
/// - ログファイルは `~/.glm-cmd/logs/glm-cmd.log.YYYY-MM-DD`
///
/// ログファイルを作れない場合は警告を出してログなしで続行し、`None` を返す。
/// 戻り値のガードは `main()` で保持し続けること（ドロップすると書き込みが止まる）。
pub fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let log_dir = log_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "glm-cmd: warning: failed to create log directory {}: {e}",
            log_dir.display()
        );
        return None;
    }

    let appender = match DailyAppender::new(log_dir.clone()) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!(
                "glm-cmd: warning: failed to create log file in {}: {e}",
                log_dir.display()
            );
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = fmt()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .with_timer(LocalTimer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .try_init();

    if let Err(e) = result {
        eprintln!("glm-cmd: warning: failed to initialize logging: {e}");
        return None;
    }

    Some(guard)
}
