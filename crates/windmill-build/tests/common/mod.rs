use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;
use windmill_build::{
    BuildError, BuildMessage, BuildOptions, DaemonClient, Result, decode_build_output,
};
use windmill_core::{Digest, SyncMount};

pub const EXAMPLE_DIGEST: &str =
    "sha256:11cd0b38bc3ceb958ffb2f9bd70be3fb317ce7d255c8a4c3f4af30e298aa1aab";

pub const EXAMPLE_BUILD_OUTPUT: &str = r#"{"stream":"Step 1/1 : FROM alpine"}
{"stream":"\n"}
{"stream":" ---> 11cd0b38bc3c\n"}
{"aux":{"ID":"sha256:11cd0b38bc3ceb958ffb2f9bd70be3fb317ce7d255c8a4c3f4af30e298aa1aab"}}
{"stream":"Successfully built 11cd0b38bc3c\n"}
"#;

pub const EXAMPLE_BUILD_OUTPUT_V1_23: &str = r#"{"stream":"Step 1/1 : FROM alpine"}
{"stream":"\n"}
{"stream":" ---> 11cd0b38bc3c\n"}
{"stream":"Successfully built 11cd0b38bc3c\n"}
"#;

/// デーモン出力の返し方
pub enum Output {
    Canned(String),
    /// 何も返さずに止まる
    Stall,
}

/// ビルドコンテキストを記録する偽のデーモン
pub struct FakeDaemon {
    output: Output,
    pub images: HashMap<String, String>,
    pub contexts: Mutex<Vec<Vec<u8>>>,
    pub options: Mutex<Vec<BuildOptions>>,
    pub inspected: Mutex<Vec<String>>,
}

impl FakeDaemon {
    pub fn new(output: Output) -> Self {
        Self {
            output,
            images: HashMap::new(),
            contexts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
            inspected: Mutex::new(Vec::new()),
        }
    }

    pub fn canned(output: &str) -> Self {
        Self::new(Output::Canned(output.to_string()))
    }

    #[allow(dead_code)]
    pub fn with_image(mut self, id: &str, digest: &str) -> Self {
        self.images.insert(id.to_string(), digest.to_string());
        self
    }

    /// 最後のビルドコンテキストに含まれるファイル
    pub fn last_context(&self) -> HashMap<String, String> {
        let contexts = self.contexts.lock().unwrap();
        let archive = contexts.last().expect("no build was started").clone();
        unpack(archive)
    }
}

#[async_trait]
impl DaemonClient for FakeDaemon {
    fn build_image(
        &self,
        context: Vec<u8>,
        options: &BuildOptions,
    ) -> BoxStream<'_, Result<BuildMessage>> {
        self.contexts.lock().unwrap().push(context);
        self.options.lock().unwrap().push(options.clone());

        match &self.output {
            Output::Canned(output) => decode_build_output(output.as_bytes()),
            Output::Stall => stream::pending().boxed(),
        }
    }

    async fn inspect_image_digest(&self, id: &str) -> Result<Digest> {
        self.inspected.lock().unwrap().push(id.to_string());
        let digest = self.images.get(id).ok_or(BuildError::DigestNotFound)?;
        Ok(Digest::parse(digest)?)
    }
}

fn unpack(archive: Vec<u8>) -> HashMap<String, String> {
    let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(archive));
    let mut tar = tar::Archive::new(decoder);
    let mut files = HashMap::new();

    for entry in tar.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        files.insert(path, content);
    }
    files
}

/// 同期元ディレクトリを持つテスト用プロジェクト
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        init_tracing();
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_file(&self, name: &str, content: &str) {
        let path = self.root.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// プロジェクト全体を `/src` に同期するマウント
    pub fn src_mount(&self) -> SyncMount {
        SyncMount::new(self.path(), "/src").unwrap()
    }
}

/// ビルドの段階ログをテスト出力に流す
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
