use crate::cancel::CancelSignal;
use crate::client::{BuildOptions, DaemonClient, DockerDaemon};
use crate::context::{ContextPackager, TarContextPackager};
use crate::dockerfile::Dockerfile;
use crate::error::{BuildError, Result};
use crate::output::digest_from_build_output;
use crate::synth::{SynthesisInputs, append_labels, parse_base, synthesize};
use crate::tag::digest_as_tag;
use std::fmt;
use std::sync::Arc;
use windmill_config::{BuildSettings, Label};
use windmill_core::{Cmd, Digest, ImageRef, PathSet, RunStep, SyncMount};

const BUILD_MODE_KEY: &str = "buildMode";
const BUILD_MODE_SCRATCH: &str = "scratch";
const BUILD_MODE_EXISTING: &str = "existing";

/// 1回のビルドの入力
#[derive(Debug, Clone, Default)]
pub struct BuildInputs {
    pub base_dockerfile: String,
    pub mounts: Vec<SyncMount>,
    /// 明示的に COPY するファイル（空なら何もしない）
    pub synced: PathSet,
    pub runs: Vec<RunStep>,
    pub entrypoint: Option<Cmd>,
}

/// ビルド結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// `<repository>:tilt-<16桁>` 形式の参照
    pub reference: ImageRef,
    pub digest: Digest,
}

/// ビルドの進行段階（debugログ用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Synthesizing,
    Packaging,
    Streaming,
    ParsingOutput,
    Succeeded,
    Failed,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::Synthesizing => "synthesizing",
            BuildPhase::Packaging => "packaging",
            BuildPhase::Streaming => "streaming",
            BuildPhase::ParsingOutput => "parsing-output",
            BuildPhase::Succeeded => "succeeded",
            BuildPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Dockerfileの合成からダイジェストの解決までを行うビルダー
///
/// 状態を持たないため、複数のビルドを並行して実行できます。
pub struct ImageBuilder {
    daemon: Arc<dyn DaemonClient>,
    packager: Arc<dyn ContextPackager>,
    settings: BuildSettings,
}

impl ImageBuilder {
    pub fn new(daemon: Arc<dyn DaemonClient>, settings: BuildSettings) -> Self {
        let packager = Arc::new(TarContextPackager::new(settings.dockerfile_name.clone()));
        Self {
            daemon,
            packager,
            settings,
        }
    }

    /// ローカルのDockerデーモンに接続してビルダーを作成
    pub fn connect(settings: BuildSettings) -> Result<Self> {
        let daemon = DockerDaemon::connect()?;
        Ok(Self::new(Arc::new(daemon), settings))
    }

    /// 設定ファイルと環境変数から読み込んだ設定でビルダーを作成
    pub fn with_loaded_settings(daemon: Arc<dyn DaemonClient>) -> Result<Self> {
        let settings = windmill_config::load_settings()?;
        Ok(Self::new(daemon, settings))
    }

    /// ビルドコンテキストの作り方を差し替える
    pub fn with_packager(mut self, packager: Arc<dyn ContextPackager>) -> Self {
        self.packager = packager;
        self
    }

    /// ベースDockerfileとステップからイメージをビルド
    pub async fn build(&self, cancel: &CancelSignal, inputs: &BuildInputs) -> Result<BuildOutput> {
        let result = self.build_scratch(cancel, inputs).await;
        log_result(&result);
        result
    }

    /// ユーザーのDockerfileをそのままビルド（`buildMode=existing`）
    pub async fn build_dockerfile(
        &self,
        cancel: &CancelSignal,
        dockerfile: &str,
        mounts: &[SyncMount],
    ) -> Result<BuildOutput> {
        let result = async {
            enter(BuildPhase::Synthesizing);
            let mut df = parse_base(dockerfile)?;
            append_labels(&mut df, &self.labels(BUILD_MODE_EXISTING))?;
            self.build_from(cancel, &df, mounts).await
        }
        .await;
        log_result(&result);
        result
    }

    async fn build_scratch(&self, cancel: &CancelSignal, inputs: &BuildInputs) -> Result<BuildOutput> {
        enter(BuildPhase::Synthesizing);
        let labels = self.labels(BUILD_MODE_SCRATCH);
        let df = synthesize(&SynthesisInputs {
            base_dockerfile: &inputs.base_dockerfile,
            mounts: &inputs.mounts,
            synced: &inputs.synced,
            runs: &inputs.runs,
            entrypoint: inputs.entrypoint.as_ref(),
            labels: &labels,
        })?;

        self.build_from(cancel, &df, &inputs.mounts).await
    }

    async fn build_from(
        &self,
        cancel: &CancelSignal,
        dockerfile: &Dockerfile,
        mounts: &[SyncMount],
    ) -> Result<BuildOutput> {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let text = dockerfile.to_string();
        tracing::trace!("Synthesized Dockerfile:\n{}", text);

        enter(BuildPhase::Packaging);
        let context = self.packager.package(mounts, &text)?;

        enter(BuildPhase::Streaming);
        let options = self.build_options();
        let messages = self.daemon.build_image(context, &options);

        enter(BuildPhase::ParsingOutput);
        let digest = digest_from_build_output(self.daemon.as_ref(), cancel, messages).await?;

        let tag = digest_as_tag(&digest)?;
        let reference = ImageRef::new(self.settings.repository.clone(), tag)?;

        Ok(BuildOutput { reference, digest })
    }

    /// `buildMode` の後に設定の追加ラベルを並べる
    fn labels(&self, build_mode: &str) -> Vec<Label> {
        let mut labels = vec![Label::new(BUILD_MODE_KEY, build_mode)];
        labels.extend(self.settings.extra_labels.iter().cloned());
        labels
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            dockerfile: self.settings.dockerfile_name.clone(),
            pull: self.settings.pull,
            no_cache: self.settings.no_cache,
            remove_intermediates: true,
        }
    }
}

fn enter(phase: BuildPhase) {
    tracing::debug!(%phase, "Image build phase");
}

fn log_result(result: &Result<BuildOutput>) {
    match result {
        Ok(output) => {
            enter(BuildPhase::Succeeded);
            tracing::info!("Successfully built: {}", output.reference);
        }
        Err(e) if e.is_cancelled() => {
            enter(BuildPhase::Failed);
            tracing::debug!("Image build cancelled");
        }
        Err(e) => {
            enter(BuildPhase::Failed);
            tracing::debug!("Image build failed: {}", e);
        }
    }
}
