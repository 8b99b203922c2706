use crate::diff::Transition;

/// Desktop popup for a finished run. Non-terminal transitions stay in the console.
#[cfg(feature = "desktop-notify")]
pub fn send_desktop(transition: &Transition) {
    use crate::model::JobStatus;
    use notify_rust::{Notification, Urgency};

    let (summary, icon, urgency) = match transition.to {
        JobStatus::Completed => ("Test completed", "dialog-information", Urgency::Normal),
        JobStatus::Failed => ("Test failed", "dialog-error", Urgency::Critical),
        JobStatus::Cancelled => ("Test cancelled", "dialog-warning", Urgency::Normal),
        _ => return,
    };

    if let Err(e) = Notification::new()
        .summary(summary)
        .body(&transition.title)
        .icon(icon)
        .urgency(urgency)
        .show()
    {
        tracing::debug!(job_id = %transition.job_id, error = %e, "desktop notification failed");
    }
}

#[cfg(not(feature = "desktop-notify"))]
pub fn send_desktop(_transition: &Transition) {}
