//! モデル定義
//!
//! ビルドパイプラインで使用されるデータモデルを定義します。
//! 各モデルは機能ごとにモジュールに分離されています。

mod image;
mod path_set;
mod run;
mod sync;

// Re-exports
pub use image::*;
pub use path_set::*;
pub use run::*;
pub use sync::*;
