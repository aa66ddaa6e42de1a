//! ビルドのキャンセル
//!
//! デーモン出力の読み取りをキャンセルと競合させるためのシグナルです。

use tokio::sync::watch;

/// キャンセルを発行する側
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// キャンセルを待つ側（複製可能）
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// 対になるハンドルとシグナルを作成
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// キャンセルされることのないシグナル
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // 送信側を破棄しても値は false のまま残る
        drop(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// キャンセルされるまで待つ
    ///
    /// ハンドルがキャンセルせずに破棄された場合は永遠に完了しません。
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
