//! Default comment templates posted by the bot.

/// Posted alongside the stale label.
pub const STALE_ISSUE_MESSAGE: &str = r#####"This issue has not had any activity for a while, so it has been marked as **stale**.

It will be closed if no further activity occurs. If this issue is still relevant, please leave a comment and the label will be removed."#####;

/// Posted right before a stale issue is closed.
pub const CLOSE_ISSUE_MESSAGE: &str = r#####"This issue has been automatically closed because it has been stale with no further activity.

If you believe this is still relevant, please open a new issue that references this one."#####;

/// Posted when nobody from the maintainer team has responded yet.
pub const TRIAGE_REMINDER_MESSAGE: &str = r#####"This issue has not been triaged yet. A maintainer should take a look, confirm the problem, and apply the appropriate labels."#####;

/// Posted when a maintainer is waiting on the reporter.
pub const REPLY_REMINDER_MESSAGE: &str = r#####"A maintainer has asked for more information on this issue. Could you please follow up when you get a chance?"#####;
