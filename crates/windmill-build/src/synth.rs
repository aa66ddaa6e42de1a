//! Dockerfile 合成
//!
//! ベースDockerfile、同期マウント、RUNステップ、ラベルから
//! ビルドに使うDockerfileを組み立てます。命令の順序がビルドの正しさを
//! 左右するため、入力の順序をそのまま保ちます。
//!
//! ビルドコンテキストには各マウントのファイルがイメージ内パスに
//! 配置されるので、COPY の転送元と転送先は同じパスになります。

use crate::dockerfile::{Dockerfile, Instruction, Kind};
use crate::error::{BuildError, Result};
use std::path::{Path, PathBuf};
use windmill_config::Label;
use windmill_core::{Cmd, PathSet, RunStep, SyncMount, container_path_for};

/// ラベルキーの接頭辞
pub const LABEL_PREFIX: &str = "tilt.";

/// 合成の入力
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInputs<'a> {
    pub base_dockerfile: &'a str,
    pub mounts: &'a [SyncMount],
    /// 明示的に COPY するファイルの選択
    pub synced: &'a PathSet,
    pub runs: &'a [RunStep],
    pub entrypoint: Option<&'a Cmd>,
    pub labels: &'a [Label],
}

/// 1回の合成中だけ存在する作業状態
struct Synthesis<'a> {
    mounts: &'a [SyncMount],
    dockerfile: Dockerfile,
}

/// Dockerfileを合成
///
/// 1. ベースDockerfileの命令をそのまま
/// 2. 同期対象ファイルの COPY
/// 3. 先頭から連続するトリガー付きステップ（トリガーファイルの COPY + RUN）
/// 4. `ADD . /`
/// 5. 残りのステップの RUN
/// 6. ENTRYPOINT（指定時）
/// 7. `LABEL "tilt.<key>"="<value>"`
pub fn synthesize(inputs: &SynthesisInputs<'_>) -> Result<Dockerfile> {
    for mount in inputs.mounts {
        if !mount.container_path.is_absolute() {
            return Err(BuildError::InvalidInput(format!(
                "Sync container path must be absolute: {}",
                mount.container_path.display()
            )));
        }
    }

    let mut synthesis = Synthesis {
        mounts: inputs.mounts,
        dockerfile: parse_base(inputs.base_dockerfile)?,
    };

    add_synced_files(&mut synthesis, inputs.synced)?;
    let remaining = add_conditional_steps(&mut synthesis, inputs.runs)?;

    synthesis
        .dockerfile
        .push(Instruction::add(Path::new("."), Path::new("/"))?);

    for run in remaining {
        synthesis.dockerfile.push(Instruction::run(&run.cmd)?);
    }

    if let Some(entrypoint) = inputs.entrypoint {
        synthesis.dockerfile.push(Instruction::entrypoint(entrypoint)?);
    }

    append_labels(&mut synthesis.dockerfile, inputs.labels)?;

    Ok(synthesis.dockerfile)
}

/// 後ろに命令を追加するベースDockerfileをパース
///
/// 最後の命令が `\` で終わっていると、追加した命令がその命令に連結されてしまう。
pub fn parse_base(text: &str) -> Result<Dockerfile> {
    let dockerfile = Dockerfile::parse(text);
    let dangling = dockerfile
        .instructions()
        .last()
        .filter(|last| last.kind != Kind::Comment)
        .is_some_and(|last| last.to_string().ends_with('\\'));
    if dangling {
        return Err(BuildError::InvalidInput(
            "Base Dockerfile ends with a line continuation".to_string(),
        ));
    }
    Ok(dockerfile)
}

/// `LABEL "tilt.<key>"="<value>"` を順に追加
pub fn append_labels(dockerfile: &mut Dockerfile, labels: &[Label]) -> Result<()> {
    for label in labels {
        if label.key.is_empty() {
            return Err(BuildError::InvalidInput("LABEL key is empty".to_string()));
        }
        let key = format!("{}{}", LABEL_PREFIX, label.key);
        dockerfile.push(Instruction::label(&key, &label.value)?);
    }
    Ok(())
}

fn add_synced_files(synthesis: &mut Synthesis<'_>, synced: &PathSet) -> Result<()> {
    if synced.is_empty() {
        return Ok(());
    }

    let files = synced.concrete_files()?;
    for mount in synthesis.mounts {
        for file in &files {
            if let Some(dest) = mount.container_path_for(file) {
                synthesis.dockerfile.push(Instruction::copy(&dest, &dest)?);
            }
        }
    }

    Ok(())
}

/// 先頭から連続するトリガー付きステップを追加し、残りを返す
fn add_conditional_steps<'r>(
    synthesis: &mut Synthesis<'_>,
    runs: &'r [RunStep],
) -> Result<&'r [RunStep]> {
    let mut consumed = 0;

    for run in runs {
        let Some(triggers) = &run.triggers else {
            break;
        };

        for file in triggers.concrete_files()? {
            let dest = trigger_destination(synthesis.mounts, &file)?;
            synthesis.dockerfile.push(Instruction::copy(&dest, &dest)?);
        }
        synthesis.dockerfile.push(Instruction::run(&run.cmd)?);
        consumed += 1;
    }

    Ok(&runs[consumed..])
}

fn trigger_destination(mounts: &[SyncMount], file: &Path) -> Result<PathBuf> {
    container_path_for(mounts, file).ok_or_else(|| {
        BuildError::InvalidInput(format!(
            "Trigger file is not under any sync mount: {}",
            file.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("a.txt"), "a").unwrap();
            fs::write(dir.path().join("b.txt"), "b").unwrap();
            Self { dir }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn mounts(&self) -> Vec<SyncMount> {
            vec![SyncMount::new(self.path(), "/src").unwrap()]
        }
    }

    fn labels() -> Vec<Label> {
        vec![Label::new("buildMode", "scratch"), Label::new("test", "1")]
    }

    #[test]
    fn test_conditional_run() {
        let f = Fixture::new();
        let mounts = f.mounts();
        let runs = vec![
            RunStep::new(Cmd::shell("cat /src/a.txt > /src/c.txt"))
                .with_triggers(PathSet::new(["a.txt"], f.path()).unwrap()),
            RunStep::new(Cmd::shell("cat /src/b.txt > /src/d.txt")),
        ];
        let synced = PathSet::empty(f.path());
        let labels = labels();

        let df = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &mounts,
            synced: &synced,
            runs: &runs,
            entrypoint: None,
            labels: &labels,
        })
        .unwrap();

        assert_eq!(
            df.to_string(),
            "FROM alpine\n\
             COPY /src/a.txt /src/a.txt\n\
             RUN cat /src/a.txt > /src/c.txt\n\
             ADD . /\n\
             RUN cat /src/b.txt > /src/d.txt\n\
             LABEL \"tilt.buildMode\"=\"scratch\"\n\
             LABEL \"tilt.test\"=\"1\""
        );
    }

    #[test]
    fn test_all_conditional_runs() {
        let f = Fixture::new();
        let mounts = f.mounts();
        let runs = vec![
            RunStep::new(Cmd::shell("cat /src/a.txt > /src/c.txt"))
                .with_triggers(PathSet::new(["a.txt"], f.path()).unwrap()),
        ];
        let synced = PathSet::empty(f.path());
        let labels = labels();

        let df = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &mounts,
            synced: &synced,
            runs: &runs,
            entrypoint: None,
            labels: &labels,
        })
        .unwrap();

        assert_eq!(
            df.to_string(),
            "FROM alpine\n\
             COPY /src/a.txt /src/a.txt\n\
             RUN cat /src/a.txt > /src/c.txt\n\
             ADD . /\n\
             LABEL \"tilt.buildMode\"=\"scratch\"\n\
             LABEL \"tilt.test\"=\"1\""
        );
    }

    #[test]
    fn test_untriggered_step_ends_conditional_prefix() {
        let f = Fixture::new();
        let mounts = f.mounts();
        let runs = vec![
            RunStep::new(Cmd::shell("step1")),
            RunStep::new(Cmd::shell("step2"))
                .with_triggers(PathSet::new(["b.txt"], f.path()).unwrap()),
        ];
        let synced = PathSet::empty(f.path());

        let df = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &mounts,
            synced: &synced,
            runs: &runs,
            entrypoint: None,
            labels: &[],
        })
        .unwrap();

        // トリガー付きでも未消費のステップはそのまま RUN になる
        assert_eq!(df.to_string(), "FROM alpine\nADD . /\nRUN step1\nRUN step2");
    }

    #[test]
    fn test_synced_files_and_entrypoint() {
        let f = Fixture::new();
        let mounts = f.mounts();
        let synced = PathSet::new(["*.txt"], f.path()).unwrap();
        let entrypoint = Cmd::new(["/src/app", "--verbose"]);

        let df = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM golang:1.21\nWORKDIR /src",
            mounts: &mounts,
            synced: &synced,
            runs: &[],
            entrypoint: Some(&entrypoint),
            labels: &[Label::new("buildMode", "scratch")],
        })
        .unwrap();

        assert_eq!(
            df.to_string(),
            "FROM golang:1.21\n\
             WORKDIR /src\n\
             COPY /src/a.txt /src/a.txt\n\
             COPY /src/b.txt /src/b.txt\n\
             ADD . /\n\
             ENTRYPOINT [\"/src/app\",\"--verbose\"]\n\
             LABEL \"tilt.buildMode\"=\"scratch\""
        );
    }

    #[test]
    fn test_synthesized_text_round_trips() {
        let f = Fixture::new();
        let mounts = f.mounts();
        let runs = vec![
            RunStep::new(Cmd::shell("make deps"))
                .with_triggers(PathSet::new(["a.txt", "b.txt"], f.path()).unwrap()),
            RunStep::new(Cmd::new(["make", "build"])),
        ];
        let synced = PathSet::empty(f.path());
        let labels = labels();

        let df = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine\n# base image\nENV A=1",
            mounts: &mounts,
            synced: &synced,
            runs: &runs,
            entrypoint: None,
            labels: &labels,
        })
        .unwrap();

        let text = df.to_string();
        let reparsed = Dockerfile::parse(&text);
        assert_eq!(reparsed, df);
        assert_eq!(reparsed.to_string(), text);
    }

    #[test]
    fn test_trigger_outside_mounts_fails() {
        let f = Fixture::new();
        let other = tempdir().unwrap();
        fs::write(other.path().join("x.txt"), "x").unwrap();

        let mounts = f.mounts();
        let runs = vec![
            RunStep::new(Cmd::shell("cat /x.txt"))
                .with_triggers(PathSet::new(["x.txt"], other.path()).unwrap()),
        ];
        let synced = PathSet::empty(f.path());

        let result = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &mounts,
            synced: &synced,
            runs: &runs,
            entrypoint: None,
            labels: &[],
        });
        assert!(matches!(result, Err(BuildError::InvalidInput(_))));
    }

    #[test]
    fn test_missing_trigger_file_is_skipped() {
        let f = Fixture::new();
        let mounts = f.mounts();
        let runs = vec![
            RunStep::new(Cmd::shell("echo gone"))
                .with_triggers(PathSet::new(["deleted.txt"], f.path()).unwrap()),
        ];
        let synced = PathSet::empty(f.path());

        let df = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &mounts,
            synced: &synced,
            runs: &runs,
            entrypoint: None,
            labels: &[],
        })
        .unwrap();

        assert_eq!(df.to_string(), "FROM alpine\nRUN echo gone\nADD . /");
    }

    #[test]
    fn test_malformed_inputs() {
        let f = Fixture::new();
        let synced = PathSet::empty(f.path());

        let relative = vec![SyncMount {
            local_path: f.path().to_path_buf(),
            container_path: PathBuf::from("src"),
        }];
        let result = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &relative,
            synced: &synced,
            runs: &[],
            entrypoint: None,
            labels: &[],
        });
        assert!(matches!(result, Err(BuildError::InvalidInput(_))));

        let mounts = f.mounts();
        let result = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &mounts,
            synced: &synced,
            runs: &[RunStep::new(Cmd::default())],
            entrypoint: None,
            labels: &[],
        });
        assert!(matches!(result, Err(BuildError::InvalidInput(_))));

        let result = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &mounts,
            synced: &synced,
            runs: &[],
            entrypoint: None,
            labels: &[Label::new("", "x")],
        });
        assert!(matches!(result, Err(BuildError::InvalidInput(_))));

        // 後続の命令が連結されてしまう入力
        let result = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine",
            mounts: &mounts,
            synced: &synced,
            runs: &[RunStep::new(Cmd::shell("echo hi \\"))],
            entrypoint: None,
            labels: &[Label::new("buildMode", "scratch")],
        });
        assert!(matches!(result, Err(BuildError::InvalidInput(_))));

        let result = synthesize(&SynthesisInputs {
            base_dockerfile: "FROM alpine\nRUN echo hi \\",
            mounts: &mounts,
            synced: &synced,
            runs: &[],
            entrypoint: None,
            labels: &[],
        });
        assert!(matches!(result, Err(BuildError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_base_allows_inner_continuation() {
        let df = parse_base("FROM alpine\nRUN apk add \\\n    git\n# trailing \\").unwrap();
        assert_eq!(df.len(), 3);
        assert_eq!(df.instructions()[1].args, "apk add \\\n    git");
    }
}
