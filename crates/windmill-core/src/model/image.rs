//! イメージダイジェストと参照

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// コンテンツハッシュ `<algorithm>:<encoded>`
///
/// ビルドデーモンかハッシュ関数からのみ生成されます。
/// 比較は文字列の完全一致です。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    pub fn parse(s: &str) -> Result<Self> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidDigest(s.to_string()))?;

        let algorithm_ok = !algorithm.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c));
        let encoded_ok = !encoded.is_empty()
            && encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "=_-".contains(c));

        if !algorithm_ok || !encoded_ok {
            return Err(CoreError::InvalidDigest(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or_default()
    }

    /// `:` 以降のエンコード部分
    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map(|(_, e)| e).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.0
    }
}

/// タグ付きイメージ参照 `name:tag`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    name: String,
    tag: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let tag = tag.into();
        let reference = format!("{}:{}", name, tag);

        validate_name(&name).map_err(|message| CoreError::InvalidReference {
            reference: reference.clone(),
            message,
        })?;
        validate_tag(&tag).map_err(|message| CoreError::InvalidReference {
            reference: reference.clone(),
            message,
        })?;

        Ok(Self { name, tag })
    }

    /// `name:tag` 形式をパース
    ///
    /// - `windmill.build/image:tilt-abc` -> `("windmill.build/image", "tilt-abc")`
    /// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
    /// - `localhost:5000/app` -> タグがないためエラー
    pub fn parse(s: &str) -> Result<Self> {
        // ポート番号の `:` はタグ区切りではない
        match s.rfind(':') {
            Some(pos) if !s[pos + 1..].contains('/') => Self::new(&s[..pos], &s[pos + 1..]),
            _ => Err(CoreError::InvalidReference {
                reference: s.to_string(),
                message: "タグが指定されていません".to_string(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

impl FromStr for ImageRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("イメージ名が空です".to_string());
    }

    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(format!("不正なイメージ名: {}", name));
    }

    // 先頭コンポーネントはレジストリホスト（ポート可）
    let (host, path) = match name.split_once('/') {
        Some((host, path)) if host.contains(['.', ':']) || host == "localhost" => (host, path),
        _ => ("", name),
    };

    for c in host.chars() {
        if !c.is_ascii_alphanumeric() && !".-:".contains(c) {
            return Err(format!("Invalid character '{}' in registry host: {}", c, host));
        }
    }

    for c in path.chars() {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c)) {
            return Err(format!("Invalid character '{}' in image name: {}", c, name));
        }
    }

    Ok(())
}

/// Docker タグの制約:
/// - 128文字以下
/// - 英数字、ピリオド、ハイフン、アンダースコアのみ
/// - 先頭はピリオドまたはハイフンではない
pub fn validate_tag(tag: &str) -> std::result::Result<(), String> {
    if tag.is_empty() {
        return Err("タグが空です".to_string());
    }

    if tag.len() > 128 {
        return Err(format!("Tag too long ({} characters, max 128)", tag.len()));
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(format!("Tag must not start with '.' or '-': {}", tag));
    }

    for c in tag.chars() {
        if !c.is_ascii_alphanumeric() && c != '.' && c != '-' && c != '_' {
            return Err(format!("Invalid character '{}' in tag: {}", c, tag));
        }
    }

    Ok(())
}
