//! BuildKit エラーメッセージの整形
//!
//! BuildKit のフロントエンドが付与する、利用者にとって意味のない前置きを
//! 取り除きます。完全な文法ではなくヒューリスティックなので、迷った場合は
//! 情報を落とすより余分な文脈を残します。

const BUILDKIT_PREAMBLE: &str = "failed to solve with frontend dockerfile.v0: failed to build LLB: ";
const EXECUTOR_FAILED: &str = "executor failed running [";
const NOT_FOUND: &str = "not found";

/// デーモンのエラーメッセージから実際に対処すべき部分を取り出す
pub fn clean_build_error(message: &str) -> String {
    // RUN の失敗: "executor failed running [...]" 以降のみ、末尾の runc のノイズは捨てる
    // コマンド自体に "]: " が含まれることがあるので最後のものを区切りにする
    if let Some(start) = message.find(EXECUTOR_FAILED) {
        let rest = &message[start..];
        return match rest.rfind("]: ") {
            Some(end) => rest[..=end].to_string(),
            None => rest.to_string(),
        };
    }

    // ファイルがない: `"/foo.txt" not found: not found` -> `"/foo.txt" not found`
    if message.matches(NOT_FOUND).count() == 2 {
        if let Some(cleaned) = quoted_not_found(message) {
            return cleaned.to_string();
        }
    }

    message
        .strip_prefix(BUILDKIT_PREAMBLE)
        .unwrap_or(message)
        .to_string()
}

fn quoted_not_found(message: &str) -> Option<&str> {
    let first = message.find(NOT_FOUND)?;
    let before = &message[..first];
    let close = before.rfind('"')?;
    let open = before[..close].rfind('"')?;
    Some(&message[open..first + NOT_FOUND.len()])
}
