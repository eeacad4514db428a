use cineplex_notification_channel::{Accent, NotificationId, NotificationView, Toast};
use console::{style, StyledObject};

/// TerminalView は通知トーストを端末に色付きで表示する。
pub struct TerminalView;

impl NotificationView for TerminalView {
    fn show(&self, toast: &Toast) {
        println!("{}", format_toast(toast));
    }

    fn begin_exit(&self, id: NotificationId) {
        println!("{}", format_dismissed(id));
    }

    fn remove(&self, _id: NotificationId) {}
}

fn accented<D>(accent: Accent, value: D) -> StyledObject<D> {
    match accent {
        Accent::Green => style(value).green(),
        Accent::Red => style(value).red(),
        Accent::Yellow => style(value).yellow(),
        Accent::Blue => style(value).cyan(),
        Accent::Gray => style(value).dim(),
    }
}

pub fn format_toast(toast: &Toast) -> String {
    let header = format!("[{}] {}", toast.type_label, toast.subject);
    format!(
        "{} {}  {}\n    {}",
        accented(toast.accent, "■"),
        accented(toast.accent, header).bold(),
        style(format!("#{}", toast.id)).dim(),
        toast.content
    )
}

pub fn format_dismissed(id: NotificationId) -> String {
    format!("  {}", style(format!("#{id} を既読にしました")).dim())
}
