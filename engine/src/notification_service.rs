use crate::db;
use crate::db::notifications::NewNotification;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::PgConnection;
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;

/// Actor persisting notifications off the critical path.
///
/// Producers enqueue through a cloned sender; the actor writes the rows
/// and logs the delivery. Losing a notification is never allowed to fail
/// the operation that produced it.
pub struct NotificationService {
    notification_sender: mpsc::Sender<NewNotification>,
}

impl NotificationService {
    pub fn new(pool: Pool<ConnectionManager<PgConnection>>) -> Self {
        let (notification_sender, mut notification_receiver) =
            mpsc::channel::<NewNotification>(100);

        tokio::spawn(async move {
            while let Some(notification) = notification_receiver.recv().await {
                tracing::info!(
                    kind = ?notification.kind,
                    recipient = %notification.recipient_party,
                    "Recording notification"
                );

                let pool = pool.clone();
                let result = spawn_blocking(move || {
                    let mut conn = pool.get()?;
                    db::notifications::insert(&mut conn, notification)?;
                    anyhow::Ok(())
                })
                .await;

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!("Could not record notification: {e:#}"),
                    Err(e) => tracing::error!("Notification task panicked: {e}"),
                }
            }
        });

        Self {
            notification_sender,
        }
    }

    /// Constructs a new sender. Use a sender to enqueue notifications from
    /// any part of the system.
    pub fn get_sender(&self) -> mpsc::Sender<NewNotification> {
        self.notification_sender.clone()
    }
}
