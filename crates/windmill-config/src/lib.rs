pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 設定ファイルパスを直接指定する環境変数
pub const SETTINGS_PATH_ENV: &str = "WINDMILL_BUILD_CONFIG";

/// ビルド結果の参照名を上書きする環境変数
pub const REPOSITORY_ENV: &str = "WINDMILL_IMAGE_REPOSITORY";

pub const DEFAULT_REPOSITORY: &str = "windmill.build/image";
pub const DEFAULT_DOCKERFILE_NAME: &str = "Dockerfile";

/// イメージビルドの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// ビルドしたイメージの参照名（タグは自動生成）
    pub repository: String,
    /// ビルドコンテキスト内のDockerfileのパス
    pub dockerfile_name: String,
    /// すべてのビルドに付与するラベル（順序を保持）
    pub extra_labels: Vec<Label>,
    /// ベースイメージを常にpullするか
    pub pull: bool,
    pub no_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            repository: DEFAULT_REPOSITORY.to_string(),
            dockerfile_name: DEFAULT_DOCKERFILE_NAME.to_string(),
            extra_labels: Vec::new(),
            pull: false,
            no_cache: false,
        }
    }
}

impl BuildSettings {
    /// YAMLファイルから読み込む（省略した項目はデフォルト値）
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 環境変数による上書きを適用
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(repository) = std::env::var(REPOSITORY_ENV) {
            let trimmed = repository.trim();
            if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidValue {
                    key: REPOSITORY_ENV.to_string(),
                    value: repository,
                });
            }
            self.repository = trimmed.to_string();
        }

        Ok(self)
    }
}

/// Windmillの設定ディレクトリパスを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("windmill");

    Ok(config_dir)
}

/// ビルド設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 WINDMILL_BUILD_CONFIG (直接パス指定、存在しなければエラー)
/// 2. ~/.config/windmill/build.yaml
///
/// どちらもなければ `None`（デフォルト設定を使用）
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(SETTINGS_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::SettingsFileNotFound(path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("windmill").join("build.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// 設定ファイルと環境変数からビルド設定を組み立てる
pub fn load_settings() -> Result<BuildSettings> {
    let settings = match find_settings_file()? {
        Some(path) => {
            tracing::debug!("Loading build settings from: {}", path.display());
            BuildSettings::from_file(&path)?
        }
        None => BuildSettings::default(),
    };

    settings.apply_env_overrides()
}
