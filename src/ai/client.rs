//! GLM API クライアント
//!
//! `/chat/completions` にリクエストを送り、非ストリーミング / ストリーミングの
//! どちらのレスポンスも `ApiResponse` にまとめて返す。
//! ストリーミング中は Ctrl-C (SIGINT) で中断できる。

use std::future::Future;
use std::time::Duration;

use async_openai::types::CreateChatCompletionRequest;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

use crate::config::Config;

use super::delta::{DeltaClassifier, StreamAccumulator};
use super::extract::{extract_command, extract_thinking};
use super::sse::{SseDecoder, SseEvent};
use super::types::{ApiError, ApiResponse, StreamSink};

const COMPLETIONS_PATH: &str = "/chat/completions";

/// `data:` 行を含まないエラー本文を判定するために保持する上限
const UNFRAMED_BODY_LIMIT: usize = 64 * 1024;

/// GLM API クライアント。1 回の起動で 1 リクエストだけ送る想定。
pub struct GlmClient {
    http: reqwest::Client,
    url: String,
}

impl GlmClient {
    /// 設定からクライアントを作る。`api_key` と `endpoint` は検証済みであること。
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Transport("API key is not configured".to_string()))?;
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| ApiError::Transport("API endpoint is not configured".to_string()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| ApiError::Transport(format!("invalid API key: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = request_timeout(config.timeout) {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            url: completions_url(endpoint),
        })
    }

    /// 非ストリーミングでリクエストを送り、回答全文からコマンドと思考過程を取り出す。
    pub async fn send(&self, request: &CreateChatCompletionRequest) -> ApiResponse {
        info!(url = %self.url, model = %request.model, "Sending chat request");

        self.complete(request).await.unwrap_or_else(|e| {
            warn!(error = %e, "Chat request failed");
            ApiResponse::failure(&e, String::new())
        })
    }

    async fn complete(
        &self,
        request: &CreateChatCompletionRequest,
    ) -> Result<ApiResponse, ApiError> {
        let response = self.post(request).await?;
        let body = response.text().await?;
        debug!(body_len = body.len(), "Chat response received");
        parse_completion(&body)
    }

    /// ストリーミングでリクエストを送り、増分を `sink` に流しながら結果を組み立てる。
    ///
    /// Ctrl-C を受けた時点で `sink` への呼び出しを止め、途中までのテキストを持つ失敗結果を返す。
    pub async fn send_stream<S>(
        &self,
        request: &CreateChatCompletionRequest,
        sink: &mut S,
    ) -> ApiResponse
    where
        S: StreamSink + ?Sized,
    {
        info!(url = %self.url, model = %request.model, "Sending streaming chat request");

        // 作成時点以降の SIGINT だけを受け取る
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                let error = ApiError::Transport(format!("failed to register SIGINT handler: {e}"));
                return ApiResponse::failure(&error, String::new());
            }
        };

        // 接続待ちも Ctrl-C で中断できるようにする
        let response = tokio::select! {
            result = self.post(request) => result,
            _ = sigint.recv() => {
                info!("Ctrl-C received while waiting for API connection, interrupting");
                return ApiResponse::failure(&ApiError::Interrupted, String::new());
            }
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Streaming request failed");
                return ApiResponse::failure(&e, String::new());
            }
        };

        let outcome = consume_stream(response.bytes_stream(), sink, async move {
            sigint.recv().await;
        })
        .await;

        outcome.into_response()
    }

    async fn post(
        &self,
        request: &CreateChatCompletionRequest,
    ) -> Result<reqwest::Response, ApiError> {
        let response = self.http.post(&self.url).json(request).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, body_len = body.len(), "API returned error status");
        Err(match server_error_message(&body) {
            Some(message) => ApiError::Protocol(message),
            None => ApiError::Transport(format!("HTTP {status}: {body}")),
        })
    }
}

/// `{endpoint}/chat/completions` を組み立てる。末尾のスラッシュは 1 つにまとめる。
fn completions_url(endpoint: &str) -> String {
    format!("{}{COMPLETIONS_PATH}", endpoint.trim_end_matches('/'))
}

/// タイムアウト秒数を解釈する。0 はタイムアウトなし。
fn request_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// `{"error": {"message": ...}}` 形式のエラーメッセージを取り出す。
fn server_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    error_message(&value)
}

fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error").filter(|e| !e.is_null())?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

/// 非ストリーミングレスポンスの本文を解釈する。
pub fn parse_completion(body: &str) -> Result<ApiResponse, ApiError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ApiError::Protocol(format!("invalid JSON response: {e}")))?;

    if let Some(message) = server_error_message(body) {
        return Err(ApiError::Protocol(message));
    }

    let message = value
        .pointer("/choices/0/message")
        .ok_or_else(|| ApiError::Protocol("response has no choices[0].message".to_string()))?;
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Protocol("response message has no content".to_string()))?;

    let reasoning = extract_thinking(content).or_else(|| {
        message
            .get("reasoning_content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    });
    let command = extract_command(content);

    debug!(
        content_len = content.len(),
        has_reasoning = reasoning.is_some(),
        has_command = command.is_some(),
        "Completion parsed"
    );

    Ok(ApiResponse::success(content.to_string(), reasoning, command))
}

/// ストリームの終わり方
#[derive(Debug)]
pub enum StreamEnd {
    /// `[DONE]` を受信した、または接続が正常に閉じられた
    Completed,
    /// Ctrl-C で中断された
    Interrupted,
    /// トランスポートエラー、またはストリーム中のエラーオブジェクトで打ち切られた
    Failed(ApiError),
}

/// ストリーム処理の結果
#[derive(Debug)]
pub struct StreamOutcome {
    pub accumulator: StreamAccumulator,
    pub end: StreamEnd,
}

impl StreamOutcome {
    /// 蓄積したテキストから `ApiResponse` を組み立てる。
    ///
    /// 思考過程は reasoning バッファを優先し、空なら回答中の「思考過程」セクションを使う。
    pub fn into_response(self) -> ApiResponse {
        let StreamAccumulator { reasoning, answer } = self.accumulator;
        match self.end {
            StreamEnd::Completed => {
                let command = extract_command(&answer);
                let reasoning = if reasoning.is_empty() {
                    extract_thinking(&answer)
                } else {
                    Some(reasoning)
                };
                ApiResponse::success(answer, reasoning, command)
            }
            StreamEnd::Interrupted => ApiResponse::failure(&ApiError::Interrupted, answer),
            StreamEnd::Failed(e) => ApiResponse::failure(&e, answer),
        }
    }
}

/// バイトストリームを SSE デコーダー → クラシファイアに流し込む。
///
/// `cancel` はチャンクより優先して監視し、完了した時点で読み取りをやめる。以降 `sink` は呼ばれない。
/// `[DONE]` を受信せずに接続が閉じた場合も、残りのレコードを処理してから終了を通知する。
/// `{"error": ...}` を含むイベント、または `data:` 行を持たないエラー本文を受け取った場合は失敗で終わる。
pub async fn consume_stream<St, B, E, S, C>(stream: St, sink: &mut S, cancel: C) -> StreamOutcome
where
    St: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ApiError>,
    S: StreamSink + ?Sized,
    C: Future<Output = ()>,
{
    let mut decoder = SseDecoder::new();
    let mut classifier = DeltaClassifier::new(sink);
    let mut chunk_count: u32 = 0;
    let mut server_error: Option<String> = None;
    let mut saw_event = false;
    let mut unframed = Vec::new();

    tokio::pin!(stream);
    tokio::pin!(cancel);

    let end = loop {
        tokio::select! {
            biased;

            _ = &mut cancel => {
                info!(
                    chunks_received = chunk_count,
                    answer_so_far_len = classifier.accumulator().answer.len(),
                    "Ctrl-C received during streaming, interrupting"
                );
                break StreamEnd::Interrupted;
            }
            chunk = stream.next() => {
                let Some(result) = chunk else {
                    decoder.finish(|event| {
                        route(event, &mut classifier, &mut server_error, &mut saw_event)
                    });
                    if !saw_event {
                        server_error = server_error_message(&String::from_utf8_lossy(&unframed));
                    }
                    if let Some(message) = server_error.take() {
                        warn!(error = %message, "API returned an error body instead of a stream");
                        break StreamEnd::Failed(ApiError::Protocol(message));
                    }
                    classifier.finish();
                    break StreamEnd::Completed;
                };

                chunk_count += 1;
                match result {
                    Ok(bytes) => {
                        let bytes = bytes.as_ref();
                        if !saw_event && unframed.len() < UNFRAMED_BODY_LIMIT {
                            unframed.extend_from_slice(bytes);
                        }
                        decoder.feed(bytes, |event| {
                            route(event, &mut classifier, &mut server_error, &mut saw_event)
                        });
                        if let Some(message) = server_error.take() {
                            warn!(
                                error = %message,
                                chunks_received = chunk_count,
                                "API reported an error mid-stream"
                            );
                            decoder.abort();
                            break StreamEnd::Failed(ApiError::Protocol(message));
                        }
                        if decoder.is_terminated() {
                            break StreamEnd::Completed;
                        }
                    }
                    Err(e) => {
                        let error: ApiError = e.into();
                        warn!(
                            error = %error,
                            chunks_received = chunk_count,
                            answer_so_far_len = classifier.accumulator().answer.len(),
                            "Stream error occurred"
                        );
                        decoder.abort();
                        break StreamEnd::Failed(error);
                    }
                }
            }
        }
    };

    debug!(
        total_chunks = chunk_count,
        decoder_state = ?decoder.state(),
        done = classifier.is_done(),
        "Stream processing completed"
    );

    StreamOutcome {
        accumulator: classifier.into_accumulator(),
        end,
    }
}

/// イベントをクラシファイアへ渡す。エラーオブジェクトを見つけたら記録し、以降は渡さない。
fn route<S: StreamSink + ?Sized>(
    event: SseEvent,
    classifier: &mut DeltaClassifier<'_, S>,
    server_error: &mut Option<String>,
    saw_event: &mut bool,
) {
    *saw_event = true;
    if server_error.is_some() {
        return;
    }
    if let SseEvent::Data(ref payload) = event {
        if let Some(message) = error_message(payload) {
            *server_error = Some(message);
            return;
        }
    }
    classifier.handle(event);
}
