use thiserror::Error;
use windmill_config::ConfigError;
use windmill_core::CoreError;

#[derive(Debug, Error)]
pub enum BuildError {
    /// ダイジェストからタグを作れない（呼び出し側の誤り）
    #[error("{0}")]
    DigestFormat(String),

    /// デーモンが報告したビルド失敗（整形済みメッセージ）
    #[error("ImageBuild: {0}")]
    BuildFailed(String),

    #[error("digest not found: Docker is not responding. Maybe Docker is out of disk space?")]
    DigestNotFound,

    #[error("build cancelled")]
    Cancelled,

    #[error("Invalid build input: {0}")]
    InvalidInput(String),

    #[error("Malformed build output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::BuildFailed(_) => {
                format!(
                    "{}\n\
                     \n\
                     Dockerfileの内容とRUNステップを確認してください。",
                    self
                )
            }
            BuildError::DigestNotFound => {
                format!(
                    "{}\n\
                     \n\
                     解決方法:\n\
                     1. Dockerデーモンが起動しているか確認してください\n\
                     2. `docker system prune` でディスク容量を確保してください",
                    self
                )
            }
            BuildError::DockerConnection(_) => {
                format!(
                    "{}\n\
                     \n\
                     DOCKER_HOST とDockerデーモンの状態を確認してください。",
                    self
                )
            }
            _ => format!("{}", self),
        }
    }

    /// キャンセルによる中断か
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
