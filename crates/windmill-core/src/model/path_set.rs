//! パスセット定義
//!
//! ルートディレクトリと、そこからの相対パスパターンの組です。
//! RUNステップのトリガーや、明示的に同期するファイルの選択に使われます。

use crate::error::{CoreError, Result};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const GLOB_META: &[char] = &['*', '?', '['];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// ルート配下のパスに対する述語
///
/// パターンが0件のパスセットは何にもマッチしません。
/// 「トリガーなし」（= 常に関連する）とは区別されます。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSet {
    pub root: PathBuf,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl PathSet {
    /// パターン一覧とルートからパスセットを作成
    ///
    /// パターンはルートからの相対パスです。`*` `?` `[` を含むものは
    /// globとして扱い、それ以外はリテラルのパス（とその配下）として扱います。
    pub fn new<I, S>(patterns: I, root: impl Into<PathBuf>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let root = root.into();
        if !root.is_absolute() {
            return Err(CoreError::RelativePath(root));
        }

        let patterns = patterns
            .into_iter()
            .map(Into::into)
            .map(validate_pattern)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { root, patterns })
    }

    /// 何にもマッチしないパスセット
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// パスがいずれかのパターンにマッチするか
    ///
    /// 絶対パスはルートからの相対パスに変換してから判定します。
    /// ルート外の絶対パスは常にマッチしません。
    pub fn matches(&self, path: impl AsRef<Path>) -> bool {
        let Some(rel) = self.relativize(path.as_ref()) else {
            return false;
        };

        self.patterns.iter().any(|p| pattern_matches(p, &rel))
    }

    /// 最初にマッチしたパスを返す
    pub fn any_match<'a, I, P>(&self, paths: I) -> Option<&'a Path>
    where
        I: IntoIterator<Item = &'a P>,
        P: AsRef<Path> + ?Sized + 'a,
    {
        paths
            .into_iter()
            .map(|p| p.as_ref())
            .find(|p| self.matches(p))
    }

    /// パスセットが選択する実在ファイルの一覧（絶対パス）
    ///
    /// パターン順に列挙します。リテラルパターンはそのファイル
    /// （ディレクトリならその配下すべて）、globパターンはルート配下の
    /// マッチするファイルをパス順に返します。重複は除かれます。
    pub fn concrete_files(&self) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for pattern in &self.patterns {
            let found = if is_glob(pattern) {
                self.walk_files(&self.root)?
                    .into_iter()
                    .filter(|f| self.matches(f))
                    .collect()
            } else {
                let path = self.root.join(pattern);
                if path.is_dir() {
                    self.walk_files(&path)?
                } else if path.is_file() {
                    vec![path]
                } else {
                    tracing::debug!("Pattern has no file on disk: {}", path.display());
                    Vec::new()
                }
            };

            for file in found {
                if seen.insert(file.clone()) {
                    files.push(file);
                }
            }
        }

        Ok(files)
    }

    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn relativize(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            path.strip_prefix(&self.root).ok().map(clean)
        } else {
            Some(clean(path))
        }
    }
}

fn validate_pattern(pattern: String) -> Result<String> {
    let invalid = |message: &str| CoreError::InvalidPattern {
        pattern: pattern.clone(),
        message: message.to_string(),
    };

    if pattern.is_empty() {
        return Err(invalid("空のパターンは指定できません"));
    }

    let path = Path::new(&pattern);
    if path.is_absolute() {
        return Err(invalid("ルートからの相対パスで指定してください"));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(invalid("ルート外を指す '..' は使用できません"));
    }

    if is_glob(&pattern) {
        Pattern::new(&pattern).map_err(|e| invalid(e.msg))?;
    }

    Ok(pattern)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(GLOB_META)
}

fn pattern_matches(pattern: &str, rel: &Path) -> bool {
    if is_glob(pattern) {
        return Pattern::new(pattern)
            .map(|g| g.matches_path_with(rel, MATCH_OPTIONS))
            .unwrap_or(false);
    }

    // リテラルはそのパス自身と配下にマッチ
    rel.starts_with(clean(Path::new(pattern)))
}

fn clean(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
