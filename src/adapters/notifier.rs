use crate::domain::{
    gateway::BoxFuture,
    notify::{Notification, Notifier, NotifyError},
};

/// Writes notifications to the `notify` log target. Stands in for the
/// mail and chat channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            let donation = notification.donation();
            tracing::info!(
                target: "notify",
                kind = notification.kind(),
                donation_id = %donation.id,
                campaign_id = %donation.campaign_id,
                amount = %donation.money,
                "notification"
            );
            Ok(())
        })
    }
}
