//! RUNステップ定義

use super::PathSet;
use serde::{Deserialize, Serialize};

/// コマンド（argv）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cmd {
    pub argv: Vec<String>,
}

impl Cmd {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// `sh -c <script>` 形式のコマンド
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new(["sh".to_string(), "-c".to_string(), script.into()])
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// シェル形式ならスクリプト本体を返す
    pub fn shell_script(&self) -> Option<&str> {
        match self.argv.as_slice() {
            [sh, flag, script] if sh == "sh" && flag == "-c" => Some(script.as_str()),
            _ => None,
        }
    }
}

/// ビルド中に実行するステップ
///
/// `triggers` は変更ファイルとの関連を表すメタデータです。
/// トリガーの有無でステップを省略するかは外部のスケジューラが決めます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStep {
    pub cmd: Cmd,
    #[serde(default)]
    pub triggers: Option<PathSet>,
}

impl RunStep {
    pub fn new(cmd: Cmd) -> Self {
        Self {
            cmd,
            triggers: None,
        }
    }

    pub fn with_triggers(mut self, triggers: PathSet) -> Self {
        self.triggers = Some(triggers);
        self
    }

    pub fn has_triggers(&self) -> bool {
        self.triggers.is_some()
    }
}
