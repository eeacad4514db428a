//! 通知トーストの表示管理。
//!
//! 受信した通知ごとに 1 つの要素を表示し、表示時間の経過または手動操作で閉じる。
//! 閉じる操作は 1 通知につき 1 回だけ既読通知を発生させる。
//! 同時表示数に上限は設けない。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::DisplayConfig;
use crate::protocol::{Notification, NotificationId, NotificationType};
use crate::scheduler::{ScheduledTask, Scheduler};

/// 通知種別ごとのアクセント色。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accent {
    Green,
    Red,
    Yellow,
    Blue,
    Gray,
}

impl Accent {
    pub fn for_type(kind: &NotificationType) -> Self {
        match kind {
            NotificationType::BookingConfirmation => Accent::Green,
            NotificationType::BookingCancellation => Accent::Red,
            NotificationType::ShowReminder => Accent::Yellow,
            NotificationType::SystemAnnouncement => Accent::Blue,
            NotificationType::Other(_) => Accent::Gray,
        }
    }

    pub fn css_color(self) -> &'static str {
        match self {
            Accent::Green => "#28a745",
            Accent::Red => "#dc3545",
            Accent::Yellow => "#ffc107",
            Accent::Blue => "#17a2b8",
            Accent::Gray => "#6c757d",
        }
    }
}

/// 画面に表示する 1 件分の通知。
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: NotificationId,
    pub notification_type: NotificationType,
    pub accent: Accent,
    pub type_label: String,
    pub subject: String,
    pub content: String,
}

impl From<&Notification> for Toast {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            notification_type: n.notification_type.clone(),
            accent: Accent::for_type(&n.notification_type),
            type_label: n.type_label().to_string(),
            subject: n.subject.clone(),
            content: n.content.clone(),
        }
    }
}

/// NotificationView は表示層との境界。
#[cfg_attr(any(feature = "mock", test), mockall::automock)]
pub trait NotificationView: Send + Sync {
    /// 新しい要素をコンテナに追加する。
    fn show(&self, toast: &Toast);
    /// 退場アニメーションを開始する。
    fn begin_exit(&self, id: NotificationId);
    /// 要素をコンテナから取り除く。
    fn remove(&self, id: NotificationId);
}

/// トレイ内部のタイマーイベント。
/// presentation は表示ごとに振られる番号で、同じ ID が再表示された後に
/// 古い表示のタイマーが届いても無視できるようにする。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    AutoDismiss {
        id: NotificationId,
        presentation: u64,
    },
    ExitFinished {
        id: NotificationId,
        presentation: u64,
    },
}

enum Phase {
    Visible {
        #[allow(dead_code)]
        auto_dismiss: ScheduledTask,
    },
    Leaving {
        #[allow(dead_code)]
        removal: ScheduledTask,
    },
}

struct Entry {
    presentation: u64,
    phase: Phase,
}

pub struct NotificationTray {
    config: DisplayConfig,
    view: Arc<dyn NotificationView>,
    entries: HashMap<NotificationId, Entry>,
    next_presentation: u64,
}

impl NotificationTray {
    pub fn new(config: DisplayConfig, view: Arc<dyn NotificationView>) -> Self {
        Self {
            config,
            view,
            entries: HashMap::new(),
            next_presentation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: NotificationId) -> bool {
        self.entries.contains_key(&id)
    }

    /// 通知を表示し、自動で閉じるタイマーを開始する。
    /// 同じ ID の通知が表示中なら何もせず false を返す。
    pub fn present<E>(&mut self, notification: &Notification, scheduler: &Scheduler<E>) -> bool
    where
        E: From<TrayEvent> + Send + 'static,
    {
        if self.entries.contains_key(&notification.id) {
            tracing::debug!(notification_id = %notification.id, "表示中の通知を重複受信したため無視します");
            return false;
        }

        let presentation = self.next_presentation;
        self.next_presentation += 1;

        let toast = Toast::from(notification);
        self.view.show(&toast);
        let auto_dismiss = scheduler.after(
            self.config.display_duration(),
            TrayEvent::AutoDismiss {
                id: notification.id,
                presentation,
            }
            .into(),
        );
        self.entries.insert(
            notification.id,
            Entry {
                presentation,
                phase: Phase::Visible { auto_dismiss },
            },
        );
        true
    }

    /// 表示中の通知を閉じる。既読通知を送るべき場合に true を返す。
    /// 退場中・未表示の通知に対しては何もしない。
    pub fn dismiss<E>(&mut self, id: NotificationId, scheduler: &Scheduler<E>) -> bool
    where
        E: From<TrayEvent> + Send + 'static,
    {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if matches!(entry.phase, Phase::Leaving { .. }) {
            return false;
        }

        self.view.begin_exit(id);
        let removal = scheduler.after(
            self.config.exit_transition(),
            TrayEvent::ExitFinished {
                id,
                presentation: entry.presentation,
            }
            .into(),
        );
        // 自動クローズのタイマーはここで破棄される
        entry.phase = Phase::Leaving { removal };
        true
    }

    /// 退場アニメーション終了後に要素を取り除く。
    pub fn finish_exit(&mut self, id: NotificationId) -> bool {
        match self.entries.get(&id) {
            Some(Entry {
                phase: Phase::Leaving { .. },
                ..
            }) => {
                self.entries.remove(&id);
                self.view.remove(id);
                true
            }
            _ => false,
        }
    }

    /// タイマーイベントを処理し、既読通知が必要な ID を返す。
    /// 現在の表示と番号が一致しないイベントは捨てる。
    pub fn handle<E>(&mut self, event: TrayEvent, scheduler: &Scheduler<E>) -> Option<NotificationId>
    where
        E: From<TrayEvent> + Send + 'static,
    {
        match event {
            TrayEvent::AutoDismiss { id, presentation } => {
                if !self.is_current(id, presentation) {
                    return None;
                }
                self.dismiss(id, scheduler).then_some(id)
            }
            TrayEvent::ExitFinished { id, presentation } => {
                if self.is_current(id, presentation) {
                    self.finish_exit(id);
                }
                None
            }
        }
    }

    /// すべての要素を取り除き、保留中のタイマーを破棄する。既読通知は送らない。
    pub fn clear(&mut self) {
        for (id, _) in self.entries.drain() {
            self.view.remove(id);
        }
    }

    fn is_current(&self, id: NotificationId, presentation: u64) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.presentation == presentation)
    }
}

/// InMemoryNotificationView は表示操作を記録するだけのビュー。
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Shown(Toast),
    ExitStarted(NotificationId),
    Removed(NotificationId),
}

#[derive(Default)]
pub struct InMemoryNotificationView {
    events: Mutex<Vec<ViewEvent>>,
}

impl InMemoryNotificationView {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: ViewEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 現在コンテナに残っている要素を表示順に返す。
    pub fn visible(&self) -> Vec<Toast> {
        let mut visible: Vec<Toast> = Vec::new();
        for event in self.events() {
            match event {
                ViewEvent::Shown(toast) => visible.push(toast),
                ViewEvent::Removed(id) => visible.retain(|t| t.id != id),
                ViewEvent::ExitStarted(_) => {}
            }
        }
        visible
    }

    pub fn shown_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ViewEvent::Shown(_)))
            .count()
    }
}

impl NotificationView for InMemoryNotificationView {
    fn show(&self, toast: &Toast) {
        self.record(ViewEvent::Shown(toast.clone()));
    }

    fn begin_exit(&self, id: NotificationId) {
        self.record(ViewEvent::ExitStarted(id));
    }

    fn remove(&self, id: NotificationId) {
        self.record(ViewEvent::Removed(id));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockall::predicate::eq;
    use tokio::sync::mpsc;

    use super::*;

    fn notification(id: i64, kind: NotificationType) -> Notification {
        Notification {
            id: NotificationId(id),
            notification_type: kind,
            notification_type_name: String::new(),
            subject: format!("subject {id}"),
            content: format!("content {id}"),
        }
    }

    fn tray_with(
        view: Arc<dyn NotificationView>,
    ) -> (
        NotificationTray,
        Scheduler<TrayEvent>,
        mpsc::UnboundedReceiver<TrayEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            NotificationTray::new(DisplayConfig::default(), view),
            Scheduler::new(tx),
            rx,
        )
    }

    #[test]
    fn test_accent_by_type() {
        assert_eq!(
            Accent::for_type(&NotificationType::BookingConfirmation),
            Accent::Green
        );
        assert_eq!(
            Accent::for_type(&NotificationType::BookingCancellation),
            Accent::Red
        );
        assert_eq!(Accent::for_type(&NotificationType::ShowReminder), Accent::Yellow);
        assert_eq!(
            Accent::for_type(&NotificationType::SystemAnnouncement),
            Accent::Blue
        );
        assert_eq!(
            Accent::for_type(&NotificationType::Other("X".to_string())),
            Accent::Gray
        );
        assert_eq!(Accent::Green.css_color(), "#28a745");
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_shows_once_and_schedules_auto_dismiss() {
        let mut view = MockNotificationView::new();
        view.expect_show()
            .withf(|toast: &Toast| toast.id == NotificationId(1) && toast.accent == Accent::Green)
            .times(1)
            .return_const(());
        let (mut tray, scheduler, mut rx) = tray_with(Arc::new(view));

        let n = notification(1, NotificationType::BookingConfirmation);
        assert!(tray.present(&n, &scheduler));
        assert!(!tray.present(&n, &scheduler));
        assert_eq!(tray.len(), 1);

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            TrayEvent::AutoDismiss { id, .. } if id == NotificationId(1)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_runs_once() {
        let mut view = MockNotificationView::new();
        view.expect_show().times(1).return_const(());
        view.expect_begin_exit()
            .with(eq(NotificationId(3)))
            .times(1)
            .return_const(());
        view.expect_remove()
            .with(eq(NotificationId(3)))
            .times(1)
            .return_const(());
        let (mut tray, scheduler, mut rx) = tray_with(Arc::new(view));

        tray.present(&notification(3, NotificationType::ShowReminder), &scheduler);
        assert!(tray.dismiss(NotificationId(3), &scheduler));
        assert!(!tray.dismiss(NotificationId(3), &scheduler));

        tokio::time::sleep(Duration::from_millis(301)).await;
        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            TrayEvent::ExitFinished { id, .. } if id == NotificationId(3)
        ));
        assert_eq!(tray.handle(event, &scheduler), None);
        assert!(tray.is_empty());

        // 手動で閉じた後は自動クローズが発火しない
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_dismiss_requests_ack() {
        let view = Arc::new(InMemoryNotificationView::new());
        let (mut tray, scheduler, mut rx) = tray_with(view.clone());

        tray.present(&notification(5, NotificationType::SystemAnnouncement), &scheduler);
        tokio::time::sleep(Duration::from_millis(5_001)).await;
        let event = rx.try_recv().unwrap();
        assert_eq!(tray.handle(event, &scheduler), Some(NotificationId(5)));
        // 退場中の自動クローズは既読通知を要求しない
        assert_eq!(tray.handle(event, &scheduler), None);

        tokio::time::sleep(Duration::from_millis(301)).await;
        let event = rx.try_recv().unwrap();
        tray.handle(event, &scheduler);

        assert_eq!(
            view.events(),
            vec![
                ViewEvent::Shown(Toast::from(&notification(5, NotificationType::SystemAnnouncement))),
                ViewEvent::ExitStarted(NotificationId(5)),
                ViewEvent::Removed(NotificationId(5)),
            ]
        );
        assert!(view.visible().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stack_is_unbounded() {
        let view = Arc::new(InMemoryNotificationView::new());
        let (mut tray, scheduler, _rx) = tray_with(view.clone());

        for id in 0..200 {
            assert!(tray.present(&notification(id, NotificationType::ShowReminder), &scheduler));
        }
        assert_eq!(tray.len(), 200);
        assert_eq!(view.visible().len(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_removes_everything_without_ack() {
        let view = Arc::new(InMemoryNotificationView::new());
        let (mut tray, scheduler, mut rx) = tray_with(view.clone());

        tray.present(&notification(1, NotificationType::ShowReminder), &scheduler);
        tray.present(&notification(2, NotificationType::ShowReminder), &scheduler);
        tray.clear();

        assert!(tray.is_empty());
        assert!(view.visible().is_empty());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_from_cleared_presentation_is_ignored() {
        let view = Arc::new(InMemoryNotificationView::new());
        let (mut tray, scheduler, mut rx) = tray_with(view.clone());
        let n = notification(8, NotificationType::ShowReminder);

        tray.present(&n, &scheduler);
        tokio::time::sleep(Duration::from_millis(5_001)).await;
        // 自動クローズがキューに積まれたまま消去される
        let stale = rx.try_recv().unwrap();
        tray.clear();

        assert!(tray.present(&n, &scheduler));
        assert_eq!(tray.handle(stale, &scheduler), None);
        assert!(tray.contains(NotificationId(8)));
        assert_eq!(view.visible().len(), 1);
        assert!(!view
            .events()
            .iter()
            .any(|e| matches!(e, ViewEvent::ExitStarted(_))));

        // 新しい表示は自身のタイマーで閉じる
        tokio::time::sleep(Duration::from_millis(5_001)).await;
        let fresh = rx.try_recv().unwrap();
        assert_eq!(tray.handle(fresh, &scheduler), Some(NotificationId(8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_from_cleared_presentation_is_ignored() {
        let view = Arc::new(InMemoryNotificationView::new());
        let (mut tray, scheduler, mut rx) = tray_with(view.clone());
        let n = notification(9, NotificationType::ShowReminder);

        tray.present(&n, &scheduler);
        tray.dismiss(NotificationId(9), &scheduler);
        tokio::time::sleep(Duration::from_millis(301)).await;
        let stale = rx.try_recv().unwrap();
        tray.clear();

        tray.present(&n, &scheduler);
        tray.dismiss(NotificationId(9), &scheduler);
        assert_eq!(tray.handle(stale, &scheduler), None);
        assert!(tray.contains(NotificationId(9)));

        tokio::time::sleep(Duration::from_millis(301)).await;
        let fresh = rx.try_recv().unwrap();
        tray.handle(fresh, &scheduler);
        assert!(tray.is_empty());
    }

    #[test]
    fn test_dismiss_unknown_id() {
        let (tx, _rx) = mpsc::unbounded_channel::<TrayEvent>();
        let scheduler = Scheduler::new(tx);
        let mut tray =
            NotificationTray::new(DisplayConfig::default(), Arc::new(InMemoryNotificationView::new()));
        assert!(!tray.dismiss(NotificationId(99), &scheduler));
        assert!(!tray.finish_exit(NotificationId(99)));
    }
}
