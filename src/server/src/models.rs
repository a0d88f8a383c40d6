mod change_log;
mod notification_audit;
mod session;

pub(crate) use change_log::{ChangeLogEntry, NewChangeLogEntry};
pub(crate) use notification_audit::{NewNotificationAudit, NotificationAudit};
pub(crate) use session::{Actor, Session};
