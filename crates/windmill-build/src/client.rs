//! Dockerデーモンとの接続
//!
//! ビルドパイプラインはデーモンを `DaemonClient` 越しにしか使いません。
//! 本番では bollard による `DockerDaemon`、テストでは偽のクライアントを渡します。

use crate::error::{BuildError, Result};
use crate::output::{BuildMessage, ErrorDetail};
use async_trait::async_trait;
use bollard::Docker;
use bollard::image::BuildImageOptions;
use bollard::models::BuildInfo;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use http_body_util::{Either, Full};
use windmill_core::Digest;

/// デーモンに渡すビルドオプション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// コンテキスト内のDockerfileのパス
    pub dockerfile: String,
    pub pull: bool,
    pub no_cache: bool,
    /// 中間コンテナを削除するか（失敗時も含む）
    pub remove_intermediates: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            dockerfile: windmill_config::DEFAULT_DOCKERFILE_NAME.to_string(),
            pull: false,
            no_cache: false,
            remove_intermediates: true,
        }
    }
}

#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// ビルドを開始し、出力メッセージのストリームを返す
    fn build_image(
        &self,
        context: Vec<u8>,
        options: &BuildOptions,
    ) -> BoxStream<'_, Result<BuildMessage>>;

    /// イメージID（短縮形を含む）から完全なダイジェストを取得
    async fn inspect_image_digest(&self, id: &str) -> Result<Digest>;
}

/// bollard によるデーモンクライアント
#[derive(Debug, Clone)]
pub struct DockerDaemon {
    docker: Docker,
}

impl DockerDaemon {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// DOCKER_HOST またはローカルのソケットに接続
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker))
    }
}

#[async_trait]
impl DaemonClient for DockerDaemon {
    fn build_image(
        &self,
        context: Vec<u8>,
        options: &BuildOptions,
    ) -> BoxStream<'_, Result<BuildMessage>> {
        let build_options = BuildImageOptions {
            dockerfile: options.dockerfile.clone(),
            pull: options.pull,
            nocache: options.no_cache,
            rm: options.remove_intermediates,
            forcerm: options.remove_intermediates,
            ..Default::default()
        };
        tracing::debug!("Build options: {:?}", build_options);

        let body = Full::new(Bytes::from(context));
        self.docker
            .build_image(build_options, None, Some(Either::Left(body)))
            .map(|item| item.map(BuildMessage::from).map_err(BuildError::from))
            .boxed()
    }

    async fn inspect_image_digest(&self, id: &str) -> Result<Digest> {
        let image = self.docker.inspect_image(id).await?;
        let digest = image.id.ok_or(BuildError::DigestNotFound)?;
        Ok(Digest::parse(&digest)?)
    }
}

impl From<BuildInfo> for BuildMessage {
    #[allow(deprecated)]
    fn from(info: BuildInfo) -> Self {
        Self {
            id: info.id,
            stream: info.stream,
            status: info.status,
            error: info.error,
            error_detail: info.error_detail.map(|detail| ErrorDetail {
                code: detail.code,
                message: detail.message,
            }),
            aux: info
                .aux
                .and_then(|aux| aux.id)
                .map(|id| serde_json::json!({ "ID": id })),
        }
    }
}
