use clap::Parser;

/// 自然言語からシェルコマンドを生成する
#[derive(Debug, Parser)]
#[command(
    name = "glm-cmd",
    version,
    about = "自然言語からシェルコマンドを生成する",
    disable_version_flag = true
)]
pub struct Cli {
    /// 生成したいコマンドの説明。省略時は標準入力から読む
    #[arg(value_name = "QUERY")]
    pub query: Vec<String>,

    /// バージョンを表示して終了する
    #[arg(short = 'v', long = "version")]
    pub show_version: bool,

    /// 詳細出力（生の回答やデバッグログ）
    #[arg(short = 'V', long)]
    pub verbose: bool,

    /// システム情報と設定を表示して終了する
    #[arg(short = 'i', long)]
    pub info: bool,

    /// 対話形式で設定ファイルを作成する
    #[arg(short = 'I', long)]
    pub init: bool,

    /// 会話履歴を表示して終了する
    #[arg(short = 'H', long)]
    pub history: bool,

    /// 会話履歴を削除して終了する
    #[arg(short = 'c', long = "clear-history")]
    pub clear_history: bool,

    /// ストリーミングを使わずに一括で受信する
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    /// 確認なしで生成したコマンドを実行する
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl Cli {
    /// 引数の単語を空白 1 つで連結したクエリ。引数がなければ None。
    pub fn query_text(&self) -> Option<String> {
        let text = self.query.join(" ");
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("glm-cmd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn query_words_are_joined() {
        let cli = parse(&["find", "large", "files"]);
        assert_eq!(cli.query_text().as_deref(), Some("find large files"));
        assert!(!cli.yes);
        assert!(!cli.no_stream);
    }

    #[test]
    fn flags_are_parsed() {
        let cli = parse(&["-V", "-y", "--no-stream", "list", "ports"]);
        assert!(cli.verbose);
        assert!(cli.yes);
        assert!(cli.no_stream);
        assert_eq!(cli.query_text().as_deref(), Some("list ports"));
    }

    #[test]
    fn management_flags_need_no_query() {
        assert!(parse(&["--history"]).history);
        assert!(parse(&["-c"]).clear_history);
        assert!(parse(&["-I"]).init);
        assert!(parse(&["-i"]).info);
        assert!(parse(&["-v"]).show_version);
        assert!(parse(&[]).query_text().is_none());
    }
}
