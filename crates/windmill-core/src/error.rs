use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("無効なダイジェスト: {0:?}")]
    InvalidDigest(String),

    #[error("無効なイメージ参照: {reference:?}\n理由: {message}")]
    InvalidReference { reference: String, message: String },

    #[error("無効なパスパターン: {pattern:?}\n理由: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("絶対パスが必要です: {0}")]
    RelativePath(PathBuf),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
