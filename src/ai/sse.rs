//! Server-Sent Events デコーダー
//!
//! トランスポートから任意サイズのチャンクで届くバイト列を 1 バイトずつバッファに積み、
//! 改行をレコード境界としてイベントを切り出す。
//! チャンク境界が UTF-8 のマルチバイト文字や JSON トークンの途中に来ても、
//! デコードはレコード単位でしか行わないため結果は変わらない。

use serde_json::Value;
use tracing::debug;

const DATA_PREFIX: &[u8] = b"data: ";
const DONE_SENTINEL: &[u8] = b"[DONE]";

/// デコーダーが切り出したイベント
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// `data: ` の後ろの JSON ペイロード
    Data(Value),
    /// `data: [DONE]` による終了通知
    Done,
}

/// デコーダーの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// レコードの途中（またはレコード間）
    Accumulating,
    /// `[DONE]` を受信した。以降のバイトは無視する。
    Done,
    /// トランスポートエラーで打ち切られた。以降のバイトは無視する。
    Aborted,
}

/// 1 リクエスト分の SSE 再組み立て状態。
///
/// レコード長の上限は設けない（バッファは必要に応じて伸長する）。
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    state: DecoderState,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: DecoderState::Accumulating,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// 終端状態（Done / Aborted）に達しているかどうか
    pub fn is_terminated(&self) -> bool {
        self.state != DecoderState::Accumulating
    }

    /// チャンクを投入し、完成したイベントを到着順に `on_event` へ渡す。
    pub fn feed(&mut self, chunk: &[u8], mut on_event: impl FnMut(SseEvent)) {
        for &byte in chunk {
            if self.is_terminated() {
                return;
            }
            if byte != b'\n' {
                self.buffer.push(byte);
                continue;
            }
            // 空バッファでの改行はレコード間の区切り（\n\n の 2 つ目）
            if self.buffer.is_empty() {
                continue;
            }
            let record = std::mem::take(&mut self.buffer);
            self.dispatch(&record, &mut on_event);
        }
    }

    /// トランスポートが改行なしで終了した場合に、残っているレコードを処理する。
    pub fn finish(&mut self, mut on_event: impl FnMut(SseEvent)) {
        if self.is_terminated() || self.buffer.is_empty() {
            self.buffer.clear();
            return;
        }
        let record = std::mem::take(&mut self.buffer);
        self.dispatch(&record, &mut on_event);
    }

    /// トランスポートエラーによりストリームを打ち切る。
    pub fn abort(&mut self) {
        if self.state == DecoderState::Accumulating {
            self.state = DecoderState::Aborted;
        }
        self.buffer.clear();
    }

    fn dispatch(&mut self, record: &[u8], on_event: &mut impl FnMut(SseEvent)) {
        if let Some(event) = parse_record(record) {
            if event == SseEvent::Done {
                self.state = DecoderState::Done;
            }
            on_event(event);
        }
    }
}

/// 1 レコード（改行を含まない）を解釈する。
///
/// 空行・コメント行（`:` 始まり）・`data: ` 以外の行は黙って捨てる。
/// JSON として不正なペイロードも捨てる。
pub fn parse_record(record: &[u8]) -> Option<SseEvent> {
    let record = record.strip_suffix(b"\r").unwrap_or(record);

    if record.is_empty() || record.starts_with(b":") {
        return None;
    }

    let payload = record.strip_prefix(DATA_PREFIX)?;

    if payload == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }

    match serde_json::from_slice::<Value>(payload) {
        Ok(value) => Some(SseEvent::Data(value)),
        Err(e) => {
            debug!(
                error = %e,
                payload = %String::from_utf8_lossy(payload),
                "Dropping malformed SSE frame"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<SseEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            decoder.feed(chunk, |e| events.push(e));
        }
        decoder.finish(|e| events.push(e));
        events
    }

    const STREAM: &str = concat!(
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"考え中\"}}]}\n\n",
        "event: message\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"```bash\\nls\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" -la\\n```\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[test]
    fn single_frame_yields_one_event() {
        let events = decode_chunks(&[b"data: {\"choices\":[{\"delta\":{\"content\":\"ls\"}}]}\n\n"]);
        assert_eq!(
            events,
            vec![SseEvent::Data(json!({"choices": [{"delta": {"content": "ls"}}]}))]
        );
    }

    #[test]
    fn byte_by_byte_matches_single_chunk() {
        let whole = decode_chunks(&[STREAM.as_bytes()]);
        let bytes: Vec<&[u8]> = STREAM.as_bytes().chunks(1).collect();
        let split = decode_chunks(&bytes);

        assert_eq!(whole.len(), 4);
        assert_eq!(whole, split);
    }

    #[test]
    fn odd_chunk_sizes_split_multibyte_characters() {
        let whole = decode_chunks(&[STREAM.as_bytes()]);
        for size in [2, 3, 5, 7, 13] {
            let chunks: Vec<&[u8]> = STREAM.as_bytes().chunks(size).collect();
            assert_eq!(decode_chunks(&chunks), whole, "chunk size {size}");
        }
    }

    #[test]
    fn done_is_terminal() {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        decoder.feed(
            b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
            |e| events.push(e),
        );
        decoder.finish(|e| events.push(e));

        assert_eq!(events, vec![SseEvent::Done]);
        assert_eq!(decoder.state(), DecoderState::Done);
    }

    #[test]
    fn invalid_json_is_dropped_and_stream_continues() {
        let events = decode_chunks(&[
            b"data: {\"choices\": [\n\n",
            b"data: {\"ok\":true}\n\n",
        ]);
        assert_eq!(events, vec![SseEvent::Data(json!({"ok": true}))]);
    }

    #[test]
    fn non_data_lines_and_comments_are_ignored() {
        assert_eq!(parse_record(b": ping"), None);
        assert_eq!(parse_record(b"event: delta"), None);
        assert_eq!(parse_record(b"id: 42"), None);
        assert_eq!(parse_record(b"data:{\"no\":\"space\"}"), None);
        assert_eq!(parse_record(b""), None);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let events = decode_chunks(&[b"data: {\"a\":1}\r\n\r\ndata: [DONE]\r\n\r\n"]);
        assert_eq!(events, vec![SseEvent::Data(json!({"a": 1})), SseEvent::Done]);
    }

    #[test]
    fn finish_flushes_unterminated_record() {
        let events = decode_chunks(&[b"data: {\"tail\":", b"1}"]);
        assert_eq!(events, vec![SseEvent::Data(json!({"tail": 1}))]);
    }

    #[test]
    fn abort_discards_partial_record() {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        decoder.feed(b"data: {\"partial\":", |e| events.push(e));
        decoder.abort();
        decoder.feed(b"1}\n\n", |e| events.push(e));
        decoder.finish(|e| events.push(e));

        assert!(events.is_empty());
        assert_eq!(decoder.state(), DecoderState::Aborted);
    }
}
