//! Windmill core build model
//!
//! イメージビルドパイプラインが扱うデータモデルを提供します。
//! パスセット（トリガー判定）、同期マウント、RUNステップ、
//! イメージダイジェストと参照を含みます。

pub mod error;
pub mod model;

pub use error::{CoreError, Result};
pub use model::*;
