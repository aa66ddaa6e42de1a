//! Windmill incremental image build
//!
//! ベースDockerfileと同期マウント・RUNステップから、Dockerのレイヤー
//! キャッシュが効く順序のDockerfileを合成し、デーモンでビルドして
//! ダイジェスト由来のタグが付いたイメージ参照を返します。
//!
//! - `synth`: Dockerfileの合成
//! - `output`: デーモン出力の解析とダイジェスト解決
//! - `cleaner`: BuildKit エラーメッセージの整形
//! - `tag`: ダイジェストとタグの相互変換
//! - `builder`: 以上をまとめたビルドの実行

pub mod builder;
pub mod cancel;
pub mod cleaner;
pub mod client;
pub mod context;
pub mod dockerfile;
pub mod error;
pub mod output;
pub mod synth;
pub mod tag;

pub use builder::{BuildInputs, BuildOutput, BuildPhase, ImageBuilder};
pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use cleaner::clean_build_error;
pub use client::{BuildOptions, DaemonClient, DockerDaemon};
pub use context::{ContextPackager, TarContextPackager};
pub use dockerfile::{Dockerfile, Instruction, Kind};
pub use error::{BuildError, Result};
pub use output::{
    BuildMessage, BuildOutputEvent, BuildOutputParser, decode_build_output,
    digest_from_build_output,
};
pub use synth::{SynthesisInputs, synthesize};
pub use tag::{IMAGE_TAG_PREFIX, digest_as_tag, digest_matches_ref};
