//! ダイジェストとタグの相互変換
//!
//! ビルド結果のダイジェストから、イメージ参照に使う短いタグを導出します。
//! 同じダイジェストからは常に同じタグが得られるため、既存の参照が
//! あるダイジェストから作られたものかをデーモンに問い合わせずに判定できます。

use crate::error::{BuildError, Result};
use windmill_core::{Digest, ImageRef};

/// 自動生成タグの接頭辞
pub const IMAGE_TAG_PREFIX: &str = "tilt-";

const TAG_HASH_LEN: usize = 16;

/// ダイジェストからタグを導出
///
/// `tilt-` + エンコード部分の先頭16文字（小文字化）。
pub fn digest_as_tag(digest: &Digest) -> Result<String> {
    let encoded = digest.encoded();
    if encoded.len() < TAG_HASH_LEN {
        return Err(BuildError::DigestFormat(format!(
            "Digest too short: {}",
            encoded
        )));
    }

    let hash = &encoded[..TAG_HASH_LEN];
    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BuildError::DigestFormat(format!(
            "Digest is not hex encoded: {}",
            encoded
        )));
    }

    Ok(format!("{}{}", IMAGE_TAG_PREFIX, hash.to_ascii_lowercase()))
}

/// 参照のタグがダイジェストから導出されたものか
///
/// 変換に失敗した場合はエラーではなく `false` を返します。
pub fn digest_matches_ref(reference: &ImageRef, digest: &Digest) -> bool {
    match digest_as_tag(digest) {
        Ok(tag) => reference.tag() == tag,
        Err(_) => false,
    }
}
