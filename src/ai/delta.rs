//! ストリーミング増分の振り分け
//!
//! SSE イベントの `choices[0].delta` を見て、思考過程（reasoning）か最終回答（content）かを判定し、
//! 対応するバッファに追記しつつシンクへ転送する。

use serde_json::Value;
use tracing::debug;

use super::sse::SseEvent;
use super::types::{ContentKind, StreamSink};

/// 思考過程と回答を別々に蓄積するバッファ。1 リクエストの間だけ伸び続ける。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamAccumulator {
    pub reasoning: String,
    pub answer: String,
}

/// delta オブジェクトで思考過程を表すフィールド名（プロバイダにより異なる）
const REASONING_FIELDS: [&str; 2] = ["reasoning_content", "reasoning"];

/// SSE イベントを受け取り、テキストを振り分けるクラシファイア。
pub struct DeltaClassifier<'a, S: StreamSink + ?Sized> {
    sink: &'a mut S,
    accumulator: StreamAccumulator,
    done: bool,
    event_count: u32,
}

impl<'a, S: StreamSink + ?Sized> DeltaClassifier<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self {
            sink,
            accumulator: StreamAccumulator::default(),
            done: false,
            event_count: 0,
        }
    }

    /// デコーダーからのイベントを処理する。
    pub fn handle(&mut self, event: SseEvent) {
        match event {
            SseEvent::Data(payload) => self.classify(&payload),
            SseEvent::Done => self.finish(),
        }
    }

    /// JSON ペイロード 1 件を処理する。
    ///
    /// reasoning と content はそれぞれ独立に扱い、空でない増分ごとに 1 回シンクを呼ぶ。
    /// どちらも存在しなければ何もしない。終了通知の後は何も出力しない。
    pub fn classify(&mut self, payload: &Value) {
        if self.done {
            return;
        }
        self.event_count += 1;

        let Some(delta) = payload.pointer("/choices/0/delta") else {
            debug!(event = self.event_count, "SSE event without choices[0].delta");
            return;
        };

        // 空文字のフィールドは無いものとして次の候補を見る
        let reasoning = REASONING_FIELDS.iter().find_map(|field| {
            delta
                .get(*field)
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
        });
        if let Some(text) = reasoning {
            self.accumulator.reasoning.push_str(text);
            self.sink.on_delta(text, ContentKind::Reasoning);
        }

        if let Some(text) = delta
            .get("content")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            self.accumulator.answer.push_str(text);
            self.sink.on_delta(text, ContentKind::Answer);
        }
    }

    /// 終了通知をシンクへ 1 回だけ送る。
    pub fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        debug!(
            events = self.event_count,
            reasoning_len = self.accumulator.reasoning.len(),
            answer_len = self.accumulator.answer.len(),
            "Stream classification finished"
        );
        self.sink.on_delta("", ContentKind::Done);
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn accumulator(&self) -> &StreamAccumulator {
        &self.accumulator
    }

    pub fn into_accumulator(self) -> StreamAccumulator {
        self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Emissions = Vec<(String, ContentKind)>;

    fn run(events: Vec<SseEvent>) -> (Emissions, StreamAccumulator) {
        let mut emitted = Vec::new();
        let mut sink = |text: &str, kind: ContentKind| emitted.push((text.to_string(), kind));
        let mut classifier = DeltaClassifier::new(&mut sink);
        for event in events {
            classifier.handle(event);
        }
        let accumulator = classifier.into_accumulator();
        (emitted, accumulator)
    }

    fn content(text: &str) -> SseEvent {
        SseEvent::Data(json!({"choices": [{"delta": {"content": text}}]}))
    }

    fn reasoning(text: &str) -> SseEvent {
        SseEvent::Data(json!({"choices": [{"delta": {"reasoning_content": text}}]}))
    }

    #[test]
    fn answer_increment_is_emitted_once() {
        let (emitted, acc) = run(vec![content("ls")]);
        assert_eq!(emitted, vec![("ls".to_string(), ContentKind::Answer)]);
        assert_eq!(acc.answer, "ls");
        assert!(acc.reasoning.is_empty());
    }

    #[test]
    fn reasoning_and_answer_go_to_separate_buffers() {
        let (emitted, acc) = run(vec![
            reasoning("need "),
            reasoning("listing"),
            content("```bash\n"),
            content("ls\n```"),
            SseEvent::Done,
        ]);

        assert_eq!(acc.reasoning, "need listing");
        assert_eq!(acc.answer, "```bash\nls\n```");
        let kinds: Vec<_> = emitted.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                ContentKind::Reasoning,
                ContentKind::Reasoning,
                ContentKind::Answer,
                ContentKind::Answer,
                ContentKind::Done,
            ]
        );
    }

    #[test]
    fn both_fields_in_one_event_are_handled_independently() {
        let (emitted, acc) = run(vec![SseEvent::Data(json!({
            "choices": [{"delta": {"reasoning": "why", "content": "what"}}]
        }))]);
        assert_eq!(
            emitted,
            vec![
                ("why".to_string(), ContentKind::Reasoning),
                ("what".to_string(), ContentKind::Answer),
            ]
        );
        assert_eq!(acc.reasoning, "why");
        assert_eq!(acc.answer, "what");
    }

    #[test]
    fn empty_reasoning_content_falls_through_to_reasoning() {
        let (emitted, acc) = run(vec![
            SseEvent::Data(json!({
                "choices": [{"delta": {"reasoning_content": "", "reasoning": "why"}}]
            })),
            SseEvent::Data(json!({
                "choices": [{"delta": {"reasoning_content": null, "reasoning": " not"}}]
            })),
        ]);
        assert_eq!(
            emitted,
            vec![
                ("why".to_string(), ContentKind::Reasoning),
                (" not".to_string(), ContentKind::Reasoning),
            ]
        );
        assert_eq!(acc.reasoning, "why not");
    }

    #[test]
    fn empty_or_missing_fields_emit_nothing() {
        let (emitted, acc) = run(vec![
            content(""),
            SseEvent::Data(json!({"choices": [{"delta": {"role": "assistant"}}]})),
            SseEvent::Data(json!({"choices": []})),
            SseEvent::Data(json!({"usage": {"total_tokens": 3}})),
            SseEvent::Data(json!({"choices": [{"delta": {"content": null}}]})),
        ]);
        assert!(emitted.is_empty());
        assert_eq!(acc, StreamAccumulator::default());
    }

    #[test]
    fn done_emits_once_and_silences_later_events() {
        let (emitted, acc) = run(vec![SseEvent::Done, content("late"), SseEvent::Done]);
        assert_eq!(emitted, vec![(String::new(), ContentKind::Done)]);
        assert!(acc.answer.is_empty());
    }
}
