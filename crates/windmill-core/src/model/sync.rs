//! 同期マウント定義

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// ローカルディレクトリからイメージ内パスへのマッピング
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMount {
    pub local_path: PathBuf,
    pub container_path: PathBuf,
}

impl SyncMount {
    /// 両方とも絶対パスである必要があります
    pub fn new(local_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Result<Self> {
        let local_path = local_path.into();
        let container_path = container_path.into();

        for path in [&local_path, &container_path] {
            if !path.is_absolute() {
                return Err(CoreError::RelativePath(path.clone()));
            }
        }

        Ok(Self {
            local_path,
            container_path,
        })
    }

    /// ローカルファイルに対応するイメージ内パス
    ///
    /// マウント外のファイルなら `None`。
    pub fn container_path_for(&self, local_file: &Path) -> Option<PathBuf> {
        let rel = local_file.strip_prefix(&self.local_path).ok()?;
        if rel.as_os_str().is_empty() {
            return Some(self.container_path.clone());
        }
        Some(self.container_path.join(rel))
    }
}

/// ローカルファイルを含む最初のマウントからイメージ内パスを求める
pub fn container_path_for(mounts: &[SyncMount], local_file: &Path) -> Option<PathBuf> {
    mounts.iter().find_map(|m| m.container_path_for(local_file))
}
