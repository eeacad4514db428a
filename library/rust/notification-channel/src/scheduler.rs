//! キャンセル可能なタイマー。
//!
//! タイマーは発火時にイベントをチャネルのイベントキューへ投入するだけで、
//! 状態の変更はすべてキューを消費する側で行う。

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

pub struct Scheduler<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Send + 'static> Scheduler<E> {
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Self {
        Self { tx }
    }

    /// delay 経過後に event を一度だけ投入する。
    pub fn after(&self, delay: Duration, event: E) -> ScheduledTask {
        let tx = self.tx.clone();
        ScheduledTask::new(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        }))
    }

    /// first 経過後に一度、その後は period ごとに make() の結果を投入する。
    pub fn every<F>(&self, first: Duration, period: Duration, make: F) -> ScheduledTask
    where
        F: Fn() -> E + Send + 'static,
    {
        let tx = self.tx.clone();
        let period = period.max(MIN_PERIOD);
        ScheduledTask::new(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(make()).is_err() {
                    break;
                }
            }
        }))
    }

    /// 任意の非同期処理をキャンセル可能なタスクとして起動する。
    pub fn spawn<F>(&self, task: F) -> ScheduledTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        ScheduledTask::new(tokio::spawn(task))
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<E> {
        self.tx.clone()
    }
}

/// ScheduledTask は起動済みタスクのハンドル。
/// cancel() または Drop で未完了のタスクを中断する。
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    pub fn cancel(self) {
        // Drop で abort される
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
