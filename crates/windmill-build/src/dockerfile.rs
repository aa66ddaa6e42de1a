//! Dockerfile 中間表現
//!
//! 命令の順序付きリストとしてDockerfileを扱います。
//! シリアライズ結果を再パースして再シリアライズすると同じテキストになります。
//! 下流のキャッシュがDockerfileのテキスト自体をハッシュするためです。

use crate::error::{BuildError, Result};
use std::fmt;
use std::path::Path;
use windmill_core::Cmd;

/// 命令の種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    From,
    Copy,
    Add,
    Run,
    Label,
    Entrypoint,
    /// ベースDockerfileに含まれるその他の命令（WORKDIR, ENV, CMD ...）
    Other(String),
    Comment,
}

impl Kind {
    fn parse(keyword: &str) -> Self {
        match keyword.to_ascii_uppercase().as_str() {
            "FROM" => Kind::From,
            "COPY" => Kind::Copy,
            "ADD" => Kind::Add,
            "RUN" => Kind::Run,
            "LABEL" => Kind::Label,
            "ENTRYPOINT" => Kind::Entrypoint,
            other => Kind::Other(other.to_string()),
        }
    }

    pub fn keyword(&self) -> &str {
        match self {
            Kind::From => "FROM",
            Kind::Copy => "COPY",
            Kind::Add => "ADD",
            Kind::Run => "RUN",
            Kind::Label => "LABEL",
            Kind::Entrypoint => "ENTRYPOINT",
            Kind::Other(keyword) => keyword.as_str(),
            Kind::Comment => "#",
        }
    }
}

/// 1つの命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub kind: Kind,
    pub args: String,
}

impl Instruction {
    pub fn new(kind: Kind, args: impl Into<String>) -> Self {
        Self {
            kind,
            args: args.into(),
        }
    }

    /// `COPY <src> <dest>`
    pub fn copy(src: &Path, dest: &Path) -> Result<Self> {
        Ok(Self::new(Kind::Copy, render_paths("COPY", src, dest)?))
    }

    /// `ADD <src> <dest>`
    pub fn add(src: &Path, dest: &Path) -> Result<Self> {
        Ok(Self::new(Kind::Add, render_paths("ADD", src, dest)?))
    }

    /// シェル形式のコマンドはスクリプトそのまま、それ以外はexec形式
    pub fn run(cmd: &Cmd) -> Result<Self> {
        if cmd.is_empty() {
            return Err(BuildError::InvalidInput("RUN command is empty".to_string()));
        }

        let args = match cmd.shell_script() {
            Some(script) => bare_arg("RUN", script)?.to_string(),
            None => serde_json::to_string(&cmd.argv)?,
        };
        Ok(Self::new(Kind::Run, args))
    }

    /// `ENTRYPOINT ["argv", ...]`
    pub fn entrypoint(cmd: &Cmd) -> Result<Self> {
        if cmd.is_empty() {
            return Err(BuildError::InvalidInput(
                "ENTRYPOINT command is empty".to_string(),
            ));
        }
        Ok(Self::new(Kind::Entrypoint, serde_json::to_string(&cmd.argv)?))
    }

    /// `LABEL "key"="value"`
    pub fn label(key: &str, value: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(BuildError::InvalidInput("LABEL key is empty".to_string()));
        }
        let key = serde_json::to_string(single_line("LABEL", key)?)?;
        let value = serde_json::to_string(single_line("LABEL", value)?)?;
        Ok(Self::new(Kind::Label, format!("{}={}", key, value)))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Comment => write!(f, "#{}", self.args),
            kind if self.args.is_empty() => f.write_str(kind.keyword()),
            kind => write!(f, "{} {}", kind.keyword(), self.args),
        }
    }
}

/// 命令の順序付きリスト
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dockerfile {
    instructions: Vec<Instruction>,
}

impl Dockerfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// テキストをパース
    ///
    /// 空行は捨て、コメントは保持します。`\` で継続する行は1命令にまとめ、
    /// 改行を含めた引数テキストをそのまま保持します。
    pub fn parse(text: &str) -> Self {
        let mut instructions = Vec::new();
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix('#') {
                instructions.push(Instruction::new(Kind::Comment, comment));
                continue;
            }

            let mut logical = line.to_string();
            while logical.ends_with('\\') {
                match lines.next() {
                    Some(next) => {
                        logical.push('\n');
                        logical.push_str(next.trim_end());
                    }
                    None => break,
                }
            }

            let (keyword, args) = match logical.split_once(char::is_whitespace) {
                Some((keyword, args)) => (keyword, args.trim_start()),
                None => (logical.as_str(), ""),
            };
            instructions.push(Instruction::new(Kind::parse(keyword), args));
        }

        Self { instructions }
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// 指定種別の命令を順に返す
    pub fn find_all<'a>(&'a self, kind: &'a Kind) -> impl Iterator<Item = &'a Instruction> + 'a {
        self.instructions.iter().filter(move |i| &i.kind == kind)
    }
}

impl fmt::Display for Dockerfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.instructions.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

fn single_line<'a>(keyword: &str, value: &'a str) -> Result<&'a str> {
    if value.contains(['\n', '\r']) {
        return Err(BuildError::InvalidInput(format!(
            "{} argument must be a single line: {:?}",
            keyword, value
        )));
    }
    Ok(value)
}

/// 引用符なしで書き出す引数
///
/// パース時に前後の空白は落ち、行末の `\` は次の行と連結されるため、
/// どちらも再パースで別の命令列になる。
fn bare_arg<'a>(keyword: &str, value: &'a str) -> Result<&'a str> {
    let value = single_line(keyword, value)?;
    if value.trim() != value {
        return Err(BuildError::InvalidInput(format!(
            "{} argument must not have leading or trailing whitespace: {:?}",
            keyword, value
        )));
    }
    if value.ends_with('\\') {
        return Err(BuildError::InvalidInput(format!(
            "{} argument must not end with a line continuation: {:?}",
            keyword, value
        )));
    }
    Ok(value)
}

fn render_paths(keyword: &str, src: &Path, dest: &Path) -> Result<String> {
    let src = path_str(keyword, src)?;
    let dest = path_str(keyword, dest)?;

    // 空白を含むパスと `\` で終わるパスはJSON配列形式にする
    if src.contains(char::is_whitespace)
        || dest.contains(char::is_whitespace)
        || dest.ends_with('\\')
    {
        return Ok(serde_json::to_string(&[src, dest])?);
    }
    Ok(format!("{} {}", src, dest))
}

fn path_str<'a>(keyword: &str, path: &'a Path) -> Result<&'a str> {
    let s = path.to_str().ok_or_else(|| {
        BuildError::InvalidInput(format!("{} path is not valid UTF-8: {:?}", keyword, path))
    })?;
    single_line(keyword, s)
}
