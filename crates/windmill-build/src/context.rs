use crate::error::{BuildError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;
use windmill_core::SyncMount;

/// コンテキストサイズの警告しきい値（500MB）
const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

/// ビルドコンテキストの作成
pub trait ContextPackager: Send + Sync {
    /// 同期マウントの内容と合成したDockerfileをアーカイブにまとめる
    fn package(&self, mounts: &[SyncMount], dockerfile: &str) -> Result<Vec<u8>>;
}

/// tar.gz アーカイブを作るデフォルト実装
///
/// 各ファイルはコンテナ内のパス（先頭の `/` を除く）に置かれるため、
/// 合成した `ADD . /` でそのままコンテナ内の正しい位置に展開されます。
#[derive(Debug, Clone)]
pub struct TarContextPackager {
    dockerfile_name: String,
}

impl TarContextPackager {
    pub fn new(dockerfile_name: impl Into<String>) -> Self {
        Self {
            dockerfile_name: dockerfile_name.into(),
        }
    }

    pub fn dockerfile_name(&self) -> &str {
        &self.dockerfile_name
    }
}

impl Default for TarContextPackager {
    fn default() -> Self {
        Self::new(windmill_config::DEFAULT_DOCKERFILE_NAME)
    }
}

impl ContextPackager for TarContextPackager {
    fn package(&self, mounts: &[SyncMount], dockerfile: &str) -> Result<Vec<u8>> {
        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            for mount in mounts {
                append_mount(&mut tar, mount)?;
            }

            // Dockerfile はマウントの内容より後に追加して上書きさせる
            let mut header = tar::Header::new_gnu();
            header.set_path(&self.dockerfile_name).map_err(|e| {
                BuildError::InvalidInput(format!(
                    "Invalid Dockerfile path {}: {}",
                    self.dockerfile_name, e
                ))
            })?;
            header.set_size(dockerfile.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, dockerfile.as_bytes())?;

            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        check_context_size(archive_data.len());

        Ok(archive_data)
    }
}

fn append_mount<W: std::io::Write>(tar: &mut Builder<W>, mount: &SyncMount) -> Result<()> {
    if !mount.local_path.exists() {
        tracing::warn!(
            "Sync path does not exist, skipping: {}",
            mount.local_path.display()
        );
        return Ok(());
    }

    let dest_root = archive_root(&mount.container_path);
    for entry in WalkDir::new(&mount.local_path).sort_by_file_name() {
        let entry = entry.map_err(|e| BuildError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        // ルートそのものがファイルの場合は相対パスが空になる
        let relative = entry
            .path()
            .strip_prefix(&mount.local_path)
            .unwrap_or(Path::new(""));
        let name = if relative.as_os_str().is_empty() {
            dest_root.clone()
        } else {
            dest_root.join(relative)
        };

        tracing::trace!("Adding {} as {}", entry.path().display(), name.display());
        tar.append_path_with_name(entry.path(), &name)?;
    }

    Ok(())
}

fn archive_root(container_path: &Path) -> PathBuf {
    container_path
        .strip_prefix("/")
        .unwrap_or(container_path)
        .to_path_buf()
}

/// コンテキストサイズのチェックと警告
fn check_context_size(size: usize) {
    if size > MAX_CONTEXT_SIZE {
        tracing::warn!(
            "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
             同期するディレクトリを絞り込むことを推奨します。",
            size / 1024 / 1024
        );
    }
}
