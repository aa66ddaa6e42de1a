//! ビルド出力の解析
//!
//! デーモンが返すJSONメッセージ列を逐次読み取り、最終的なダイジェストか
//! ビルドエラーを取り出します。出力の長さに上限はないため、ストリーム全体を
//! バッファせずに1メッセージずつ処理します。
//!
//! デーモンのAPIバージョンによって結果の表し方が異なります:
//! - 新しいデーモン: `{"aux":{"ID":"sha256:..."}}` で完全なダイジェストを返す
//! - v1.23 以前: `Successfully built <short-id>` の出力のみ。inspect で解決する

use crate::cancel::CancelSignal;
use crate::cleaner::clean_build_error;
use crate::client::DaemonClient;
use crate::error::{BuildError, Result};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};
use windmill_core::Digest;

const BUILDKIT_TRACE_ID: &str = "moby.buildkit.trace";
const SUCCESSFULLY_BUILT: &str = "Successfully built ";
const READ_CHUNK: usize = 8 * 1024;

/// デーモンのJSONメッセージ1件
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildMessage {
    pub id: Option<String>,
    pub stream: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "errorDetail")]
    pub error_detail: Option<ErrorDetail>,
    pub aux: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorDetail {
    pub code: Option<i64>,
    pub message: Option<String>,
}

/// 解析済みのビルド出力イベント
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutputEvent {
    Stream(String),
    Status(String),
    ErrorDetail(String),
    /// 完全なダイジェストではないイメージID
    Aux(String),
    Digest(Digest),
}

impl BuildMessage {
    /// イベントに変換（BuildKit のトレースや空メッセージは `None`）
    pub fn into_event(self) -> Option<BuildOutputEvent> {
        let error = self
            .error_detail
            .and_then(|detail| detail.message)
            .filter(|message| !message.is_empty())
            .or(self.error.filter(|message| !message.is_empty()));
        if let Some(message) = error {
            return Some(BuildOutputEvent::ErrorDetail(message));
        }

        if let Some(aux) = self.aux {
            if self.id.as_deref() == Some(BUILDKIT_TRACE_ID) {
                return None;
            }
            let id = aux.get("ID").and_then(|id| id.as_str())?;
            return Some(match Digest::parse(id) {
                Ok(digest) => BuildOutputEvent::Digest(digest),
                Err(_) => BuildOutputEvent::Aux(id.to_string()),
            });
        }

        if let Some(text) = self.stream {
            return Some(BuildOutputEvent::Stream(text));
        }

        self.status.map(BuildOutputEvent::Status)
    }
}

/// ストリーム終了時点の解析結果
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Digest(Digest),
    /// inspect で解決が必要な短いID
    ShortId(String),
    NotFound,
}

/// 出力イベントを順に受け取り、ダイジェスト候補を追跡する
#[derive(Debug, Default)]
pub struct BuildOutputParser {
    digest: Option<Digest>,
    short_id: Option<String>,
}

impl BuildOutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// イベントを1件処理。エラーイベントなら整形したビルド失敗を返す
    pub fn observe(&mut self, event: BuildOutputEvent) -> Result<()> {
        match event {
            BuildOutputEvent::ErrorDetail(message) => {
                return Err(BuildError::BuildFailed(clean_build_error(&message)));
            }
            BuildOutputEvent::Digest(digest) => {
                self.digest = Some(digest);
            }
            BuildOutputEvent::Aux(id) => {
                self.short_id = Some(id);
            }
            BuildOutputEvent::Stream(text) => {
                tracing::trace!(target: "windmill_build::output", "{}", text.trim_end());
                if let Some(id) = text.trim().strip_prefix(SUCCESSFULLY_BUILT) {
                    self.short_id = Some(id.trim().to_string());
                }
            }
            BuildOutputEvent::Status(status) => {
                tracing::trace!(target: "windmill_build::output", "{}", status);
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Resolution {
        match (self.digest, self.short_id) {
            (Some(digest), _) => Resolution::Digest(digest),
            (None, Some(id)) => Resolution::ShortId(id),
            (None, None) => Resolution::NotFound,
        }
    }
}

/// ビルド出力からダイジェストを取り出す
///
/// エラーメッセージを受け取った時点で読み取りを止めます。
/// キャンセルされた場合は読み取り途中でも `BuildError::Cancelled` を返します。
pub async fn digest_from_build_output<S>(
    daemon: &dyn DaemonClient,
    cancel: &CancelSignal,
    mut messages: S,
) -> Result<Digest>
where
    S: Stream<Item = Result<BuildMessage>> + Unpin,
{
    let mut parser = BuildOutputParser::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BuildError::Cancelled),
            next = messages.next() => next,
        };

        let Some(message) = next else {
            break;
        };
        if let Some(event) = message?.into_event() {
            parser.observe(event)?;
        }
    }

    match parser.finish() {
        Resolution::Digest(digest) => Ok(digest),
        Resolution::ShortId(id) => {
            tracing::debug!("Resolving short image id via inspect: {}", id);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(BuildError::Cancelled),
                digest = daemon.inspect_image_digest(&id) => digest,
            }
        }
        Resolution::NotFound => Err(BuildError::DigestNotFound),
    }
}

/// バイト列からJSONメッセージを逐次デコードする
///
/// 改行区切りでも連結されたJSONでもよく、1つのオブジェクトが複数行に
/// またがっていても構いません。未読の残りだけをバッファします。
pub fn decode_build_output<'a, R>(reader: R) -> BoxStream<'a, Result<BuildMessage>>
where
    R: AsyncRead + Unpin + Send + 'a,
{
    let decoder = Decoder {
        reader,
        buf: Vec::new(),
        ready: VecDeque::new(),
        failed: None,
        eof: false,
    };

    stream::unfold(decoder, |mut decoder| async move {
        decoder.next_message().await.map(|item| (item, decoder))
    })
    .boxed()
}

struct Decoder<R> {
    reader: R,
    buf: Vec<u8>,
    ready: VecDeque<BuildMessage>,
    /// 取り出し済みのメッセージを返した後に報告するエラー
    failed: Option<BuildError>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    async fn next_message(&mut self) -> Option<Result<BuildMessage>> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Some(Ok(message));
            }
            if let Some(err) = self.failed.take() {
                return Some(Err(err));
            }

            if self.eof {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                // 途中で切れたオブジェクト
                let err = serde_json::from_slice::<BuildMessage>(&self.buf).err()?;
                self.buf.clear();
                return Some(Err(err.into()));
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.reader.read(&mut chunk).await {
                Ok(0) => self.eof = true,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    self.fail(e.into());
                    continue;
                }
            }

            if let Err(e) = self.drain_complete() {
                self.fail(e);
            }
        }
    }

    /// バッファ内の完結したメッセージを取り出す
    fn drain_complete(&mut self) -> Result<()> {
        let mut messages = serde_json::Deserializer::from_slice(&self.buf).into_iter::<BuildMessage>();
        let mut consumed = 0;

        loop {
            match messages.next() {
                Some(Ok(message)) => {
                    consumed = messages.byte_offset();
                    self.ready.push_back(message);
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    consumed = messages.byte_offset();
                    break;
                }
            }
        }

        self.buf.drain(..consumed);
        Ok(())
    }

    fn fail(&mut self, err: BuildError) {
        self.eof = true;
        self.buf.clear();
        self.failed = Some(err);
    }
}
