//! Applies a decided [`Action`] to an issue.

use tracing::{info, instrument};

use crate::{
    policy::Action,
    service::issues::{ApiResult, IssueClient},
};

/// Applies every step of `action` to issue `number`, in order.
///
/// Steps for one issue are never run concurrently. The state change (label or close) always
/// comes before the comment, so a failed step never leads to the same comment twice.
#[instrument(skip(issues, action), fields(action = action.name()))]
pub async fn apply(issues: &IssueClient, number: u64, action: &Action) -> ApiResult<()> {
    match action {
        Action::Reset { labels } => {
            for label in labels {
                issues.remove_label(number, label).await?;
            }
            info!("Removed {} state labels from #{number}", labels.len());
        }
        Action::TriageReminder { label, message } | Action::ReplyReminder { label, message } | Action::MarkStale { label, message } => {
            issues.add_labels(number, std::slice::from_ref(label)).await?;
            issues.post_comment(number, message).await?;
            info!("Labeled #{number} as `{label}`");
        }
        Action::Close { message } => {
            // Closed issues are never listed again, so a failed close cannot repeat the message.
            issues.close_issue(number).await?;
            issues.post_comment(number, message).await?;
            info!("Closed #{number}");
        }
    }

    Ok(())
}
