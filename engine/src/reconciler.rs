use crate::db;
use crate::db::channels::ChannelStatus;
use crate::db::channels::NewChannel;
use crate::db::notifications::NewNotification;
use crate::db::notifications::NotificationKind;
use crate::error::LifecycleError;
use anyhow::Context;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::Connection;
use diesel::PgConnection;
use futures::StreamExt;
use payroll_commons::ChannelId;
use payroll_commons::ChannelSyncReport;
use payroll_commons::OrganizationSyncEntry;
use payroll_commons::OrganizationSyncReport;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use xahau_client::time::drops_to_native;
use xahau_client::time::to_ripple_time;
use xahau_client::LedgerApi;
use xahau_client::LedgerError;

const VANISHED_REASON: &str = "vanished";

/// Mirrors ledger state back into the repository.
///
/// The reconciler is the only writer of `on_chain_balance` and never
/// touches `off_chain_accumulated_balance` while the channel exists on the
/// ledger: earned but unclaimed wages survive every sync.
pub struct Reconciler {
    pool: Pool<ConnectionManager<PgConnection>>,
    ledger: Arc<dyn LedgerApi>,
    notifier: mpsc::Sender<NewNotification>,
    min_interval: Duration,
    sync_concurrency: usize,
}

impl Reconciler {
    pub fn new(
        pool: Pool<ConnectionManager<PgConnection>>,
        ledger: Arc<dyn LedgerApi>,
        notifier: mpsc::Sender<NewNotification>,
        min_interval: Duration,
        sync_concurrency: usize,
    ) -> Self {
        Self {
            pool,
            ledger,
            notifier,
            min_interval,
            sync_concurrency,
        }
    }

    /// Reconciles one channel against its ledger entry.
    ///
    /// Refuses to hit the ledger again within the configured interval and
    /// reports `RecentlySynced` instead; that is a typed outcome, not an
    /// error.
    pub async fn sync_channel(&self, channel_pk: i32) -> Result<ChannelSyncReport, LifecycleError> {
        let channel = {
            let pool = self.pool.clone();
            spawn_blocking(move || {
                let mut conn = pool.get()?;
                db::channels::get(&mut conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))
            })
            .await??
        };

        if !matches!(channel.status, ChannelStatus::Active | ChannelStatus::Closing) {
            return Err(LifecycleError::ChannelStateUnexpected(
                "only active or closing channels have a ledger entry to sync".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        if let Some(last) = channel.last_ledger_sync {
            let seconds_since = (now - last).whole_seconds();
            if seconds_since < self.min_interval.as_secs() as i64 {
                return Ok(ChannelSyncReport::RecentlySynced { seconds_since });
            }
        }

        let channel_id = channel
            .channel_id
            .as_deref()
            .map(ChannelId::new)
            .transpose()
            .map_err(|e| LifecycleError::Storage(e.context("Persisted channel id is malformed")))?
            .ok_or(LifecycleError::InvariantViolation(
                "open channel without a channel id",
            ))?;

        match self.ledger.fetch_channel_entry(channel_id.as_str()).await {
            Ok(entry) => {
                let on_chain_balance = parse_drops(&entry.balance)?;
                let now_ripple = to_ripple_time(now);
                let expired = entry
                    .expiration
                    .map(|expiration| expiration <= now_ripple)
                    .unwrap_or(false);

                let pool = self.pool.clone();
                let expiration = entry.expiration;
                let (status, promoted) = spawn_blocking(move || {
                    let mut conn = pool.get()?;
                    conn.transaction(|conn| {
                        let current = db::channels::get_for_update(conn, channel_pk)?
                            .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;

                        db::channels::update_ledger_sync(
                            conn,
                            channel_pk,
                            on_chain_balance,
                            expiration,
                        )?;

                        // A scheduled closure whose expiration has passed can
                        // be finalized by anyone; we finalize the record.
                        if expired && current.status == ChannelStatus::Closing {
                            db::channels::mark_closed(
                                conn,
                                channel_pk,
                                current.closure_tx_hash.as_deref(),
                                None,
                                true,
                            )?;
                            return Ok::<_, LifecycleError>((ChannelStatus::Closed, true));
                        }

                        Ok((current.status, false))
                    })
                })
                .await??;

                if promoted {
                    self.notify_parties(
                        channel_pk,
                        NotificationKind::ClosureCompleted,
                        json!({ "channel": channel_pk, "reason": "expiration_passed" }),
                    )
                    .await;
                }

                Ok(ChannelSyncReport::Synced {
                    on_chain_balance,
                    status: to_common_status(status),
                    promoted_to_closed: promoted,
                })
            }
            Err(LedgerError::NotFound) => self.handle_vanished(channel_pk).await,
            Err(e) => Err(e.into()),
        }
    }

    /// The ledger entry is gone. A recorded successful claim explains it;
    /// otherwise the channel is marked closed as `vanished` with the
    /// off-chain balance preserved for the operator.
    async fn handle_vanished(&self, channel_pk: i32) -> Result<ChannelSyncReport, LifecycleError> {
        let pool = self.pool.clone();
        let (report, anomalous) = spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let current = db::channels::get_for_update(conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;

                if current.status == ChannelStatus::Closed {
                    return Ok::<_, LifecycleError>((
                        ChannelSyncReport::ClosedByRecordedClaim {
                            closure_tx_hash: current.closure_tx_hash.unwrap_or_default(),
                        },
                        false,
                    ));
                }

                match db::payments::get_successful_close(conn, channel_pk)? {
                    Some(event) => {
                        db::channels::mark_closed(
                            conn,
                            channel_pk,
                            Some(&event.tx_hash),
                            None,
                            true,
                        )?;
                        Ok((
                            ChannelSyncReport::ClosedByRecordedClaim {
                                closure_tx_hash: event.tx_hash,
                            },
                            false,
                        ))
                    }
                    None => {
                        db::channels::mark_closed(
                            conn,
                            channel_pk,
                            None,
                            Some(VANISHED_REASON),
                            false,
                        )?;
                        Ok((
                            ChannelSyncReport::Vanished {
                                off_chain_preserved: current.off_chain_accumulated_balance,
                            },
                            true,
                        ))
                    }
                }
            })
        })
        .await??;

        if anomalous {
            tracing::error!(
                channel_id = channel_pk,
                "Channel vanished from the ledger without a recorded claim; operator action \
                 required"
            );
            self.notify_parties(
                channel_pk,
                NotificationKind::ClosureCompleted,
                json!({ "channel": channel_pk, "reason": VANISHED_REASON }),
            )
            .await;
        }

        Ok(report)
    }

    /// Reconciles every channel of an organization: known channels are
    /// synced with bounded concurrency, ledger-only channels are imported
    /// as editable placeholder records.
    pub async fn sync_organization(
        &self,
        escrow_wallet: &str,
    ) -> Result<OrganizationSyncReport, LifecycleError> {
        let organization = {
            let pool = self.pool.clone();
            let wallet = escrow_wallet.to_string();
            spawn_blocking(move || {
                let mut conn = pool.get()?;
                db::organizations::get_by_wallet(&mut conn, &wallet)?.ok_or_else(|| {
                    LifecycleError::InvalidParameters(format!(
                        "no organization with escrow wallet {wallet}"
                    ))
                })
            })
            .await??
        };

        let ledger_channels = self
            .ledger
            .fetch_account_channels(escrow_wallet, None)
            .await?;

        let mut imported = Vec::new();
        for ledger_channel in &ledger_channels {
            let channel_id = match ChannelId::new(&ledger_channel.channel_id) {
                Ok(channel_id) => channel_id,
                Err(e) => {
                    tracing::warn!("Skipping ledger channel with malformed id: {e}");
                    continue;
                }
            };

            let pool = self.pool.clone();
            let organization_id = organization.id;
            let destination = ledger_channel.destination_account.clone();
            let escrow = parse_drops(&ledger_channel.amount)?;
            let balance = parse_drops(&ledger_channel.balance)?;
            let settle_delay = ledger_channel.settle_delay as i64;
            let cancel_after = ledger_channel.cancel_after;
            let public_key = ledger_channel.claim_public_key().map(|key| key.to_string());

            let inserted = spawn_blocking(move || {
                let mut conn = pool.get()?;
                conn.transaction(|conn| {
                    if db::channels::get_by_channel_id(conn, &channel_id)?.is_some() {
                        return Ok::<_, LifecycleError>(None);
                    }

                    let employee =
                        db::employees::get_or_create(conn, organization_id, &destination)?;
                    let channel = db::channels::insert(
                        conn,
                        NewChannel {
                            channel_id: Some(channel_id.to_string()),
                            organization_id,
                            employee_id: employee.id,
                            // Placeholders; the operator fills in job and rate.
                            job_name: "Imported channel".to_string(),
                            hourly_rate: Decimal::ZERO,
                            escrow_funded_amount: escrow,
                            off_chain_accumulated_balance: Decimal::ZERO,
                            on_chain_balance: balance,
                            settle_delay_seconds: settle_delay,
                            cancel_after_ripple_time: cancel_after,
                            public_key,
                            status: ChannelStatus::Active,
                            imported: true,
                        },
                    )?;
                    Ok(Some(channel))
                })
            })
            .await??;

            if let Some(channel) = inserted {
                tracing::info!(
                    channel_id = channel.id,
                    ledger_channel_id = %ledger_channel.channel_id,
                    "Imported ledger-only channel"
                );
                self.notify(
                    &organization.wallet_address,
                    NotificationKind::OrphanImported,
                    json!({
                        "channel": channel.id,
                        "ledger_channel_id": ledger_channel.channel_id,
                    }),
                )
                .await;
                imported.push(channel.id);
            }
        }

        // Every open channel is reconciled, including those the ledger no
        // longer lists; the per-channel sync resolves those as vanished.
        let open_channels = {
            let pool = self.pool.clone();
            let organization_id = organization.id;
            spawn_blocking(move || {
                let mut conn = pool.get()?;
                Ok::<_, LifecycleError>(db::channels::list_open_by_organization(
                    &mut conn,
                    organization_id,
                )?)
            })
            .await??
        };

        let outcomes = futures::stream::iter(open_channels)
            .map(|channel| async move {
                let report = self.sync_channel(channel.id).await;
                (channel.id, channel.channel_id.clone(), report)
            })
            .buffer_unordered(self.sync_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut synced = Vec::new();
        let mut failed = Vec::new();
        for (channel_pk, channel_id, report) in outcomes {
            match report {
                Ok(report) => synced.push(OrganizationSyncEntry {
                    channel_pk,
                    channel_id,
                    report,
                }),
                Err(e) => {
                    tracing::warn!(channel_id = channel_pk, "Channel sync failed: {e:#}");
                    failed.push((channel_pk, format!("{e:#}")));
                }
            }
        }

        Ok(OrganizationSyncReport {
            synced,
            imported,
            failed,
        })
    }

    /// Periodic entry point used by the scheduler.
    pub async fn sync_all_organizations(&self) {
        let organizations = {
            let pool = self.pool.clone();
            spawn_blocking(move || {
                let mut conn = pool.get()?;
                Ok::<_, LifecycleError>(db::organizations::list_all(&mut conn)?)
            })
            .await
        };

        let organizations = match organizations {
            Ok(Ok(organizations)) => organizations,
            Ok(Err(e)) => {
                tracing::error!("Could not load organizations for periodic sync: {e:#}");
                return;
            }
            Err(e) => {
                tracing::error!("Could not load organizations for periodic sync: {e:#}");
                return;
            }
        };

        for organization in organizations {
            match self.sync_organization(&organization.wallet_address).await {
                Ok(report) => {
                    tracing::debug!(
                        organization = %organization.wallet_address,
                        synced = report.synced.len(),
                        imported = report.imported.len(),
                        failed = report.failed.len(),
                        "Periodic organization sync finished"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        organization = %organization.wallet_address,
                        "Periodic organization sync failed: {e:#}"
                    );
                }
            }
        }
    }

    async fn notify_parties(
        &self,
        channel_pk: i32,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) {
        let pool = self.pool.clone();
        let parties = spawn_blocking(move || {
            let mut conn = pool.get()?;
            let channel = db::channels::get(&mut conn, channel_pk)?
                .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;
            let organization = db::organizations::get(&mut conn, channel.organization_id)?
                .context("Channel references a missing organization")?;
            let employee = db::employees::get(&mut conn, channel.employee_id)?
                .context("Channel references a missing employee")?;
            Ok::<_, LifecycleError>((organization.wallet_address, employee.wallet_address))
        })
        .await;

        match parties {
            Ok(Ok((organization_wallet, employee_wallet))) => {
                self.notify(&employee_wallet, kind, payload.clone()).await;
                self.notify(&organization_wallet, kind, payload).await;
            }
            Ok(Err(e)) => tracing::warn!("Could not load channel parties: {e:#}"),
            Err(e) => tracing::warn!("Could not load channel parties: {e:#}"),
        }
    }

    async fn notify(&self, recipient: &str, kind: NotificationKind, payload: serde_json::Value) {
        let notification = NewNotification {
            recipient_party: recipient.to_string(),
            kind,
            payload,
        };
        if let Err(e) = self.notifier.send(notification).await {
            tracing::warn!("Could not enqueue notification: {e}");
        }
    }
}

fn parse_drops(drops: &str) -> Result<Decimal, LifecycleError> {
    let drops: u64 = drops
        .parse()
        .context("Malformed drops amount from the ledger")?;
    Ok(drops_to_native(drops))
}

fn to_common_status(status: ChannelStatus) -> payroll_commons::ChannelStatus {
    match status {
        ChannelStatus::PendingCreate => payroll_commons::ChannelStatus::PendingCreate,
        ChannelStatus::Active => payroll_commons::ChannelStatus::Active,
        ChannelStatus::Closing => payroll_commons::ChannelStatus::Closing,
        ChannelStatus::Closed => payroll_commons::ChannelStatus::Closed,
        ChannelStatus::FailedCreate => payroll_commons::ChannelStatus::FailedCreate,
    }
}
