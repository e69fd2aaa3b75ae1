//! 回答テキストからのコマンド抽出
//!
//! モデルはプロンプトの指示に従い、「思考過程」セクションと ```bash フェンスで囲んだコマンドを返す。
//! ここではフェンスからコマンドを、マーカー間から思考過程を取り出す。

const FENCE_OPEN: &str = "```bash";
const FENCE_CLOSE: &str = "```";

/// 閉じフェンスのない末尾候補を採用する条件: この範囲に空白以外の文字があること
const UNTERMINATED_PROBE_LEN: usize = 100;

pub const THINKING_MARKER: &str = "**思考过程：**";
pub const COMMAND_MARKER: &str = "**命令：**";

/// 前後の空白（スペース・LF・CR）を取り除く。
fn trim_block(text: &str) -> &str {
    text.trim_matches(&[' ', '\n', '\r'][..])
}

/// ```bash ブロックからコマンドを抽出する。
///
/// - 閉じたブロックが複数ある場合は最後のものを採用する（モデルが途中で言い直すことがあるため）
/// - 閉じフェンスがない場合（ストリームの途中切れ）は末尾までを候補とし、それ以前の候補より優先する。
///   ただし先頭 100 バイト以内に空白以外の文字がなければ採用しない
/// - 前後の空白を除いて空になった場合は None
pub fn extract_command(text: &str) -> Option<String> {
    let mut candidate: Option<&str> = None;
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(FENCE_OPEN) {
        let body_start = cursor + found + FENCE_OPEN.len();
        let body = &text[body_start..];

        match body.find(FENCE_CLOSE) {
            Some(body_len) => {
                candidate = Some(&body[..body_len]);
                cursor = body_start + body_len + FENCE_CLOSE.len();
            }
            None => {
                let probe = &body.as_bytes()[..body.len().min(UNTERMINATED_PROBE_LEN)];
                if probe.iter().any(|b| !b.is_ascii_whitespace()) {
                    candidate = Some(body);
                }
                break;
            }
        }
    }

    let command = trim_block(candidate?);
    if command.is_empty() {
        None
    } else {
        Some(command.to_string())
    }
}

/// 「思考过程」マーカーと「命令」マーカーの間のテキストを抽出する。
///
/// どちらかのマーカーがない場合、または順序が逆の場合は None。
pub fn extract_thinking(text: &str) -> Option<String> {
    let start = text.find(THINKING_MARKER)? + THINKING_MARKER.len();
    let end = start + text[start..].find(COMMAND_MARKER)?;

    let thinking = trim_block(&text[start..end]);
    if thinking.is_empty() {
        None
    } else {
        Some(thinking.to_string())
    }
}
