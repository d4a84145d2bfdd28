use crate::closure::ClosureKind;
use crate::closure::ClosureValidator;
use crate::db;
use crate::db::channels::Channel;
use crate::db::channels::ChannelStatus;
use crate::db::channels::NewChannel;
use crate::db::notifications::NewNotification;
use crate::db::notifications::NotificationKind;
use crate::db::payments::NewPaymentEvent;
use crate::db::payments::PaymentKind;
use crate::error::LifecycleError;
use crate::gateway::GatewayError;
use crate::gateway::SigningGateway;
use crate::resolver::ChannelIdResolver;
use crate::resolver::ResolveRequest;
use crate::tracker;
use anyhow::Context;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::Connection;
use diesel::PgConnection;
use payroll_commons::CallerKind;
use payroll_commons::ChannelId;
use payroll_commons::CloseChannelParams;
use payroll_commons::ConfirmCloseParams;
use payroll_commons::ConfirmCreateParams;
use payroll_commons::ConfirmFundParams;
use payroll_commons::CreateChannelParams;
use payroll_commons::FundChannelParams;
use payroll_commons::PreparedSigning;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use uuid::Uuid;
use xahau_client::time::native_to_drops;
use xahau_client::time::to_ripple_time;
use xahau_client::transactions::PaymentChannelClaim;
use xahau_client::transactions::PaymentChannelCreate;
use xahau_client::transactions::PaymentChannelFund;
use xahau_client::transactions::UnsignedTransaction;
use xahau_client::LedgerApi;
use xahau_client::LedgerError;
use xahau_client::TES_SUCCESS;

/// Outcome of a close request.
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// A closing claim is ready for the signing ceremony.
    Prepared {
        prepared: PreparedSigning,
        expected_kind: ClosureKind,
    },
    /// The channel is already closing; no new claim is submitted.
    AlreadyClosing {
        closure_tx_hash: Option<String>,
        expiration_ripple_time: Option<i64>,
    },
    AlreadyClosed {
        closure_tx_hash: Option<String>,
    },
}

/// Committed result of a validated closing claim.
#[derive(Debug, Clone)]
pub struct CloseConfirmation {
    pub status: payroll_commons::ChannelStatus,
    pub kind: ClosureKind,
    pub closure_tx_hash: Option<String>,
    pub expiration_ripple_time: Option<i64>,
}

/// Which side of the channel a source-signed close lands on. The worker's
/// side always removes the channel; the source only does with no escrow
/// left to return.
fn expected_closure_kind(caller: CallerKind, remaining_escrow: Decimal) -> ClosureKind {
    match caller {
        CallerKind::Destination => ClosureKind::DestinationImmediate,
        CallerKind::Source if remaining_escrow <= Decimal::ZERO => ClosureKind::SourceImmediate,
        CallerKind::Source => ClosureKind::SourceScheduled,
    }
}

/// Whether a signing-ceremony failure is terminal: the signer definitively
/// declined or let the deadline pass, so the transaction will never exist.
/// Transient gateway faults are excluded; those are worth re-confirming.
fn signing_ceremony_failed(e: &LifecycleError) -> bool {
    matches!(
        e,
        LifecycleError::Gateway(
            GatewayError::Rejected | GatewayError::Expired | GatewayError::Cancelled
        )
    )
}

fn signing_failure_code(e: &LifecycleError) -> &'static str {
    match e {
        LifecycleError::Gateway(GatewayError::Rejected) => "signing_rejected",
        LifecycleError::Gateway(GatewayError::Expired) => "signing_expired",
        LifecycleError::Gateway(GatewayError::Cancelled) => "signing_cancelled",
        _ => "signing_failed",
    }
}

/// The claim's `Balance` field: the earned balance in drops, or omitted
/// entirely when nothing was earned (`Balance = "0"` next to `tfClose` is
/// `temBAD_AMOUNT`).
fn close_balance_drops(off_chain_balance: Decimal) -> anyhow::Result<Option<u64>> {
    if off_chain_balance > Decimal::ZERO {
        Ok(Some(native_to_drops(off_chain_balance)?))
    } else {
        Ok(None)
    }
}

/// Drives channels through create, close, and fund against the ledger, the
/// signing gateway, and the repository.
pub struct Lifecycle {
    pool: Pool<ConnectionManager<PgConnection>>,
    ledger: Arc<dyn LedgerApi>,
    gateway: Arc<SigningGateway>,
    resolver: ChannelIdResolver,
    validator: ClosureValidator,
    notifier: mpsc::Sender<NewNotification>,
    default_settle_delay_seconds: i64,
    default_cancel_after_seconds: i64,
}

impl Lifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Pool<ConnectionManager<PgConnection>>,
        ledger: Arc<dyn LedgerApi>,
        gateway: Arc<SigningGateway>,
        resolver: ChannelIdResolver,
        validator: ClosureValidator,
        notifier: mpsc::Sender<NewNotification>,
        default_settle_delay_seconds: i64,
        default_cancel_after_seconds: i64,
    ) -> Self {
        Self {
            pool,
            ledger,
            gateway,
            resolver,
            validator,
            notifier,
            default_settle_delay_seconds,
            default_cancel_after_seconds,
        }
    }

    /// Validates the parameters, checks the worker wallet exists on the
    /// ledger, and hands an unsigned `PaymentChannelCreate` to the signing
    /// ceremony. The channel row is persisted without a channel id; only
    /// the resolver may fill that in.
    pub async fn create_channel(
        &self,
        params: CreateChannelParams,
    ) -> Result<(payroll_commons::Channel, PreparedSigning), LifecycleError> {
        if params.hourly_rate < Decimal::ZERO {
            return Err(LifecycleError::InvalidParameters(
                "hourly rate must not be negative".to_string(),
            ));
        }
        if params.escrow_amount < Decimal::ZERO {
            return Err(LifecycleError::InvalidParameters(
                "escrow amount must not be negative".to_string(),
            ));
        }
        if params.organization_wallet.is_empty() || params.worker_wallet.is_empty() {
            return Err(LifecycleError::InvalidParameters(
                "both wallet addresses are required".to_string(),
            ));
        }
        if params.organization_wallet == params.worker_wallet {
            return Err(LifecycleError::InvalidParameters(
                "organization and worker wallet must differ".to_string(),
            ));
        }

        let settle_delay = params
            .settle_delay_seconds
            .unwrap_or(self.default_settle_delay_seconds);
        if settle_delay <= 0 {
            return Err(LifecycleError::InvalidParameters(
                "settle delay must be positive".to_string(),
            ));
        }

        // An unfunded worker wallet cannot receive a channel.
        match self.ledger.fetch_account_info(&params.worker_wallet).await {
            Ok(_) => {}
            Err(LedgerError::NotFound) => {
                return Err(LifecycleError::DestinationInactive(
                    params.worker_wallet.clone(),
                ))
            }
            Err(e @ LedgerError::MethodUnsupported(_)) => {
                tracing::warn!("Skipping destination check: {e}");
            }
            Err(e) => return Err(e.into()),
        }

        let amount_drops = native_to_drops(params.escrow_amount)
            .map_err(|e| LifecycleError::InvalidParameters(e.to_string()))?;
        let cancel_after = to_ripple_time(OffsetDateTime::now_utc())
            + params
                .cancel_after_seconds
                .unwrap_or(self.default_cancel_after_seconds);

        let tx = UnsignedTransaction::PaymentChannelCreate(PaymentChannelCreate {
            account: params.organization_wallet.clone(),
            destination: params.worker_wallet.clone(),
            amount: amount_drops.to_string(),
            settle_delay: settle_delay as u32,
            cancel_after: Some(cancel_after),
            public_key: None,
        });

        let payload = self.gateway.prepare_sign(params.wallet_provider, &tx).await?;

        let pool = self.pool.clone();
        let channel = spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let organization =
                    db::organizations::get_or_create(conn, &params.organization_wallet)?;
                let employee =
                    db::employees::get_or_create(conn, organization.id, &params.worker_wallet)?;

                let channel = db::channels::insert(
                    conn,
                    NewChannel {
                        channel_id: None,
                        organization_id: organization.id,
                        employee_id: employee.id,
                        job_name: params.job_name.unwrap_or_else(|| "Hourly work".to_string()),
                        hourly_rate: params.hourly_rate,
                        escrow_funded_amount: params.escrow_amount,
                        off_chain_accumulated_balance: Decimal::ZERO,
                        on_chain_balance: Decimal::ZERO,
                        settle_delay_seconds: settle_delay,
                        cancel_after_ripple_time: Some(cancel_after),
                        public_key: None,
                        status: ChannelStatus::PendingCreate,
                        imported: false,
                    },
                )?;

                Ok::<_, LifecycleError>(channel.to_common(
                    &organization.wallet_address,
                    &employee.wallet_address,
                ))
            })
        })
        .await??;

        tracing::info!(
            channel_id = channel.id,
            organization = %channel.organization_wallet,
            worker = %channel.worker_wallet,
            "Prepared channel create"
        );

        Ok((
            channel,
            PreparedSigning {
                unsigned_tx: tx,
                payload_ref: payload.payload_ref,
                follow_up: payload.follow_up,
            },
        ))
    }

    /// Resolves the ledger-assigned channel id for a submitted create and
    /// activates the channel. On resolver exhaustion the channel is marked
    /// failed; no placeholder id is ever persisted.
    pub async fn confirm_create(
        &self,
        channel_pk: i32,
        params: ConfirmCreateParams,
    ) -> Result<payroll_commons::Channel, LifecycleError> {
        let (channel, organization, employee) = self.load_channel(channel_pk).await?;

        match channel.status {
            ChannelStatus::PendingCreate => {}
            ChannelStatus::FailedCreate => {
                return Err(LifecycleError::ChannelStateUnexpected(
                    "channel creation already failed; operator support is required".to_string(),
                ))
            }
            // Already confirmed: idempotent.
            _ => {
                return Ok(channel.to_common(
                    &organization.wallet_address,
                    &employee.wallet_address,
                ))
            }
        }

        // A rejected, expired, or cancelled ceremony means the create
        // transaction will never exist; the channel is failed right here.
        let tx_hash = match self
            .resolve_tx_hash(params.tx_hash, params.payload_ref)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) if signing_ceremony_failed(&e) => {
                self.fail_create(
                    channel_pk,
                    channel.create_tx_hash.clone(),
                    Some(signing_failure_code(&e)),
                )
                .await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        {
            let pool = self.pool.clone();
            let tx_hash = tx_hash.clone();
            spawn_blocking(move || -> Result<(), LifecycleError> {
                let mut conn = pool.get()?;
                db::channels::set_create_tx_hash(&mut conn, channel_pk, &tx_hash)?;
                Ok(())
            })
            .await??;
        }

        let request = ResolveRequest {
            tx_hash: tx_hash.clone(),
            source: organization.wallet_address.clone(),
            destination: employee.wallet_address.clone(),
            expected_amount_drops: native_to_drops(channel.escrow_funded_amount)?,
            expected_settle_delay_seconds: channel.settle_delay_seconds as u32,
        };

        let channel_id = match self.resolver.resolve(&request).await {
            Ok(channel_id) => channel_id,
            Err(e @ LifecycleError::ChannelIdUnresolved { .. }) => {
                tracing::error!(
                    channel_id = channel_pk,
                    %tx_hash,
                    "Channel id unresolved after full retry budget, marking create failed"
                );
                self.fail_create(channel_pk, Some(tx_hash), None).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // The channel's own key, required verbatim by any later claim.
        let entry = match self.ledger.fetch_channel_entry(channel_id.as_str()).await {
            Ok(entry) => entry,
            Err(LedgerError::NotFound) => {
                return Err(LifecycleError::ChannelStateUnexpected(format!(
                    "resolved channel {channel_id} has no ledger entry"
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let on_chain_balance = drops_str_to_native(&entry.balance)?;
        let ledger_index = match self.ledger.fetch_tx(&tx_hash).await {
            Ok(tx) => tx.ledger_index,
            Err(_) => None,
        };

        let pool = self.pool.clone();
        let amount_drops = request.expected_amount_drops;
        let updated = spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let current = db::channels::get_for_update(conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;

                // Someone else may have confirmed concurrently.
                if current.status == ChannelStatus::PendingCreate {
                    db::channels::mark_active(
                        conn,
                        channel_pk,
                        &channel_id,
                        &entry.public_key,
                        on_chain_balance,
                    )?;
                    db::payments::insert(
                        conn,
                        NewPaymentEvent {
                            channel_id: channel_pk,
                            tx_hash: tx_hash.clone(),
                            kind: PaymentKind::Create,
                            amount_drops: Some(amount_drops as i64),
                            result_code: Some(TES_SUCCESS.to_string()),
                            ledger_index,
                        },
                    )?;
                }

                let channel = db::channels::get(conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;
                Ok::<_, LifecycleError>(channel)
            })
        })
        .await??;

        tracing::info!(
            channel_id = channel_pk,
            ledger_channel_id = ?updated.channel_id,
            "Channel activated"
        );

        Ok(updated.to_common(&organization.wallet_address, &employee.wallet_address))
    }

    /// The organization asks the worker to close. The channel stays fully
    /// operational; the worker is notified.
    pub async fn request_closure(&self, channel_pk: i32) -> Result<(), LifecycleError> {
        let (channel, _organization, employee) = self.load_channel(channel_pk).await?;

        if channel.status != ChannelStatus::Active {
            return Err(LifecycleError::ChannelStateUnexpected(
                "only an active channel can receive a closure request".to_string(),
            ));
        }

        let pool = self.pool.clone();
        spawn_blocking(move || -> Result<(), LifecycleError> {
            let mut conn = pool.get()?;
            db::channels::set_closure_requested(&mut conn, channel_pk)?;
            Ok(())
        })
        .await??;

        self.notify(
            &employee.wallet_address,
            NotificationKind::ClosureRequest,
            json!({
                "channel": channel_pk,
                "unpaid_balance": channel.off_chain_accumulated_balance,
            }),
        )
        .await;

        Ok(())
    }

    /// Builds the closing claim for either party. Refuses a source-side
    /// close that would abandon earned wages unless `force_close` is set;
    /// repeated closes on a closing or closed channel return the recorded
    /// outcome without submitting anything.
    pub async fn close_channel(
        &self,
        channel_pk: i32,
        params: CloseChannelParams,
    ) -> Result<CloseOutcome, LifecycleError> {
        let (channel, organization, employee) = self.load_channel(channel_pk).await?;

        match channel.status {
            ChannelStatus::Closing => {
                return Ok(CloseOutcome::AlreadyClosing {
                    closure_tx_hash: channel.closure_tx_hash,
                    expiration_ripple_time: channel.expiration_ripple_time,
                })
            }
            ChannelStatus::Closed => {
                return Ok(CloseOutcome::AlreadyClosed {
                    closure_tx_hash: channel.closure_tx_hash,
                })
            }
            ChannelStatus::Active => {}
            ChannelStatus::PendingCreate | ChannelStatus::FailedCreate => {
                return Err(LifecycleError::ChannelStateUnexpected(
                    "channel does not exist on the ledger yet".to_string(),
                ))
            }
        }

        let expected_wallet = match params.caller_kind {
            CallerKind::Source => &organization.wallet_address,
            CallerKind::Destination => &employee.wallet_address,
        };
        if &params.caller_wallet != expected_wallet {
            return Err(LifecycleError::InvalidParameters(format!(
                "wallet {} is not the channel's {}",
                params.caller_wallet, params.caller_kind
            )));
        }

        if params.caller_kind == CallerKind::Source
            && channel.off_chain_accumulated_balance > Decimal::ZERO
            && !params.force_close
        {
            return Err(LifecycleError::UnclaimedBalance {
                unpaid_balance: channel.off_chain_accumulated_balance,
                caller_kind: params.caller_kind,
            });
        }

        // A channel's lifetime bounds its sessions: whatever is still
        // running is completed now so the claim carries the final hours.
        let channel = self.finish_open_sessions(channel_pk).await?;

        let channel_id = channel
            .channel_id
            .as_deref()
            .map(ChannelId::new)
            .transpose()
            .map_err(|e| LifecycleError::Storage(e.context("Persisted channel id is malformed")))?
            .ok_or(LifecycleError::InvariantViolation(
                "active channel without a channel id",
            ))?;

        let public_key = match &channel.public_key {
            Some(public_key) => public_key.clone(),
            // Imported channels may predate key capture.
            None => match self.ledger.fetch_channel_entry(channel_id.as_str()).await {
                Ok(entry) => entry.public_key,
                Err(LedgerError::NotFound) => {
                    return Err(LifecycleError::ChannelStateUnexpected(
                        "channel entry is gone; run a sync instead of closing".to_string(),
                    ))
                }
                Err(e) => return Err(e.into()),
            },
        };

        let balance_drops = close_balance_drops(channel.off_chain_accumulated_balance)?;
        let claim = UnsignedTransaction::PaymentChannelClaim(PaymentChannelClaim::close(
            params.caller_wallet.clone(),
            channel_id.to_string(),
            balance_drops,
            Some(public_key),
        ));

        let expected_kind = expected_closure_kind(params.caller_kind, channel.remaining_escrow());
        let payload = self
            .gateway
            .prepare_sign(params.wallet_provider, &claim)
            .await?;

        tracing::info!(
            channel_id = channel_pk,
            caller_kind = %params.caller_kind,
            %expected_kind,
            balance_drops = ?balance_drops,
            "Prepared closing claim"
        );

        Ok(CloseOutcome::Prepared {
            prepared: PreparedSigning {
                unsigned_tx: claim,
                payload_ref: payload.payload_ref,
                follow_up: payload.follow_up,
            },
            expected_kind,
        })
    }

    /// Verifies a submitted closing claim and commits the transition. The
    /// ledger reads happen outside the database transaction; the
    /// transaction re-reads the row and re-verifies the status before
    /// committing.
    pub async fn confirm_close(
        &self,
        channel_pk: i32,
        params: ConfirmCloseParams,
    ) -> Result<CloseConfirmation, LifecycleError> {
        let (channel, organization, employee) = self.load_channel(channel_pk).await?;

        match channel.status {
            ChannelStatus::Closed => {
                return Ok(CloseConfirmation {
                    status: payroll_commons::ChannelStatus::Closed,
                    kind: expected_closure_kind(params.caller_kind, channel.remaining_escrow()),
                    closure_tx_hash: channel.closure_tx_hash,
                    expiration_ripple_time: channel.expiration_ripple_time,
                })
            }
            ChannelStatus::Closing => {
                return Ok(CloseConfirmation {
                    status: payroll_commons::ChannelStatus::Closing,
                    kind: ClosureKind::SourceScheduled,
                    closure_tx_hash: channel.closure_tx_hash,
                    expiration_ripple_time: channel.expiration_ripple_time,
                })
            }
            ChannelStatus::Active => {}
            ChannelStatus::PendingCreate | ChannelStatus::FailedCreate => {
                return Err(LifecycleError::ChannelStateUnexpected(
                    "channel does not exist on the ledger yet".to_string(),
                ))
            }
        }

        let tx_hash = self
            .resolve_tx_hash(params.tx_hash, params.payload_ref)
            .await?;

        let channel_id = channel
            .channel_id
            .as_deref()
            .map(ChannelId::new)
            .transpose()
            .map_err(|e| LifecycleError::Storage(e.context("Persisted channel id is malformed")))?
            .ok_or(LifecycleError::InvariantViolation(
                "active channel without a channel id",
            ))?;

        let expected_kind = expected_closure_kind(params.caller_kind, channel.remaining_escrow());

        let validation = match self
            .validator
            .validate(&channel_id, &tx_hash, expected_kind)
            .await
        {
            Ok(validation) => validation,
            Err(LifecycleError::TransactionFailed { code }) => {
                // The ledger rejected the claim. The channel stays active
                // and the earned balance is untouched; the audit trail
                // records the failure.
                let pool = self.pool.clone();
                let event_tx_hash = tx_hash.clone();
                let event_code = code.clone();
                spawn_blocking(move || -> Result<(), LifecycleError> {
                    let mut conn = pool.get()?;
                    db::payments::insert(
                        &mut conn,
                        NewPaymentEvent {
                            channel_id: channel_pk,
                            tx_hash: event_tx_hash,
                            kind: PaymentKind::ClaimClose,
                            amount_drops: None,
                            result_code: Some(event_code),
                            ledger_index: None,
                        },
                    )?;
                    Ok(())
                })
                .await??;
                return Err(LifecycleError::TransactionFailed { code });
            }
            Err(e) => return Err(e),
        };

        let amount_drops = close_balance_drops(channel.off_chain_accumulated_balance)?;
        let pool = self.pool.clone();
        let validation_for_commit = validation.clone();
        let confirmation = spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let current = db::channels::get_for_update(conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;

                // Re-verify under the lock; a concurrent confirm may have
                // won the race.
                match current.status {
                    ChannelStatus::Active => {}
                    ChannelStatus::Closing | ChannelStatus::Closed => {
                        return Ok(CloseConfirmation {
                            status: match current.status {
                                ChannelStatus::Closing => payroll_commons::ChannelStatus::Closing,
                                _ => payroll_commons::ChannelStatus::Closed,
                            },
                            kind: validation_for_commit.observed,
                            closure_tx_hash: current.closure_tx_hash,
                            expiration_ripple_time: current.expiration_ripple_time,
                        })
                    }
                    _ => {
                        return Err(LifecycleError::ChannelStateUnexpected(
                            "channel left the closable state".to_string(),
                        ))
                    }
                }

                db::payments::insert(
                    conn,
                    NewPaymentEvent {
                        channel_id: channel_pk,
                        tx_hash: validation_for_commit.tx_hash.clone(),
                        kind: PaymentKind::ClaimClose,
                        amount_drops: amount_drops.map(|drops| drops as i64),
                        result_code: Some(validation_for_commit.engine_result.clone()),
                        ledger_index: validation_for_commit.ledger_index,
                    },
                )?;

                if validation_for_commit.channel_gone {
                    db::channels::mark_closed(
                        conn,
                        channel_pk,
                        Some(&validation_for_commit.tx_hash),
                        None,
                        true,
                    )?;
                    Ok(CloseConfirmation {
                        status: payroll_commons::ChannelStatus::Closed,
                        kind: validation_for_commit.observed,
                        closure_tx_hash: Some(validation_for_commit.tx_hash.clone()),
                        expiration_ripple_time: None,
                    })
                } else {
                    let expiration = validation_for_commit
                        .expiration_ripple_time
                        .ok_or_else(|| {
                            LifecycleError::ChannelStateUnexpected(
                                "scheduled close without expiration".to_string(),
                            )
                        })?;
                    db::channels::mark_closing(
                        conn,
                        channel_pk,
                        &validation_for_commit.tx_hash,
                        expiration,
                    )?;
                    Ok(CloseConfirmation {
                        status: payroll_commons::ChannelStatus::Closing,
                        kind: validation_for_commit.observed,
                        closure_tx_hash: Some(validation_for_commit.tx_hash.clone()),
                        expiration_ripple_time: Some(expiration),
                    })
                }
            })
        })
        .await??;

        match confirmation.status {
            payroll_commons::ChannelStatus::Closed => {
                let tx_hash = confirmation.closure_tx_hash.clone();
                let payload = json!({ "channel": channel_pk, "tx_hash": tx_hash });
                self.notify(
                    &employee.wallet_address,
                    NotificationKind::ClosureCompleted,
                    payload.clone(),
                )
                .await;
                self.notify(
                    &organization.wallet_address,
                    NotificationKind::ClosureCompleted,
                    payload,
                )
                .await;
            }
            payroll_commons::ChannelStatus::Closing => {
                self.notify(
                    &employee.wallet_address,
                    NotificationKind::ClosureScheduled,
                    json!({
                        "channel": channel_pk,
                        "expiration_ripple_time": confirmation.expiration_ripple_time,
                    }),
                )
                .await;
            }
            _ => {}
        }

        tracing::info!(
            channel_id = channel_pk,
            status = ?confirmation.status,
            kind = %confirmation.kind,
            "Close confirmed"
        );

        Ok(confirmation)
    }

    /// Builds an unsigned `PaymentChannelFund` raising the escrow.
    pub async fn fund_channel(
        &self,
        channel_pk: i32,
        params: FundChannelParams,
    ) -> Result<PreparedSigning, LifecycleError> {
        let (channel, organization, _employee) = self.load_channel(channel_pk).await?;

        if channel.status != ChannelStatus::Active {
            return Err(LifecycleError::ChannelStateUnexpected(
                "only an active channel can be funded".to_string(),
            ));
        }
        if params.amount <= Decimal::ZERO {
            return Err(LifecycleError::InvalidParameters(
                "fund amount must be positive".to_string(),
            ));
        }

        let channel_id = channel.channel_id.ok_or(LifecycleError::InvariantViolation(
            "active channel without a channel id",
        ))?;
        let amount_drops = native_to_drops(params.amount)
            .map_err(|e| LifecycleError::InvalidParameters(e.to_string()))?;

        let tx = UnsignedTransaction::PaymentChannelFund(PaymentChannelFund {
            account: organization.wallet_address,
            channel: channel_id,
            amount: amount_drops.to_string(),
        });

        let payload = self.gateway.prepare_sign(params.wallet_provider, &tx).await?;

        Ok(PreparedSigning {
            unsigned_tx: tx,
            payload_ref: payload.payload_ref,
            follow_up: payload.follow_up,
        })
    }

    /// Verifies a validated `PaymentChannelFund` and raises the recorded
    /// escrow by the funded amount.
    pub async fn confirm_fund(
        &self,
        channel_pk: i32,
        params: ConfirmFundParams,
    ) -> Result<payroll_commons::Channel, LifecycleError> {
        let (channel, organization, employee) = self.load_channel(channel_pk).await?;

        if channel.status != ChannelStatus::Active {
            return Err(LifecycleError::ChannelStateUnexpected(
                "only an active channel can be funded".to_string(),
            ));
        }

        let tx_hash = self
            .resolve_tx_hash(params.tx_hash, params.payload_ref)
            .await?;

        let tx = match self.ledger.fetch_tx(&tx_hash).await {
            Ok(tx) => tx,
            Err(LedgerError::NotFound) => {
                return Err(LifecycleError::TransactionNotFinal { tx_hash })
            }
            Err(e) => return Err(e.into()),
        };
        if !tx.validated {
            return Err(LifecycleError::TransactionNotFinal { tx_hash });
        }
        if !tx.is_success() {
            return Err(LifecycleError::TransactionFailed {
                code: tx
                    .transaction_result()
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        if tx.channel.as_deref() != channel.channel_id.as_deref() {
            return Err(LifecycleError::ChannelStateUnexpected(
                "fund transaction targets a different channel".to_string(),
            ));
        }

        let amount_drops: u64 = tx
            .amount
            .as_deref()
            .context("Fund transaction carries no amount")?
            .parse()
            .context("Malformed drops amount on fund transaction")?;
        let amount = xahau_client::time::drops_to_native(amount_drops);

        let pool = self.pool.clone();
        let ledger_index = tx.ledger_index;
        let updated = spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let current = db::channels::get_for_update(conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;
                if current.status != ChannelStatus::Active {
                    return Err(LifecycleError::ChannelStateUnexpected(
                        "channel left the active state".to_string(),
                    ));
                }

                // One audit event per fund transaction keeps this idempotent.
                let already_recorded = db::payments::list_for_channel(conn, channel_pk)?
                    .iter()
                    .any(|event| event.tx_hash == tx_hash);
                if !already_recorded {
                    db::channels::add_escrow(conn, channel_pk, amount)?;
                    db::payments::insert(
                        conn,
                        NewPaymentEvent {
                            channel_id: channel_pk,
                            tx_hash: tx_hash.clone(),
                            kind: PaymentKind::Fund,
                            amount_drops: Some(amount_drops as i64),
                            result_code: Some(TES_SUCCESS.to_string()),
                            ledger_index,
                        },
                    )?;
                }

                let channel = db::channels::get(conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;
                Ok::<_, LifecycleError>(channel)
            })
        })
        .await??;

        Ok(updated.to_common(&organization.wallet_address, &employee.wallet_address))
    }

    async fn load_channel(
        &self,
        channel_pk: i32,
    ) -> Result<
        (
            Channel,
            db::organizations::Organization,
            db::employees::Employee,
        ),
        LifecycleError,
    > {
        let pool = self.pool.clone();
        spawn_blocking(move || {
            let mut conn = pool.get()?;
            let channel = db::channels::get(&mut conn, channel_pk)?
                .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;
            let organization = db::organizations::get(&mut conn, channel.organization_id)?
                .context("Channel references a missing organization")?;
            let employee = db::employees::get(&mut conn, channel.employee_id)?
                .context("Channel references a missing employee")?;
            Ok::<_, LifecycleError>((channel, organization, employee))
        })
        .await?
    }

    /// Completes whatever sessions are still running on the channel and
    /// returns the channel with the final balances.
    async fn finish_open_sessions(&self, channel_pk: i32) -> Result<Channel, LifecycleError> {
        let pool = self.pool.clone();
        spawn_blocking(move || {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                let channel = db::channels::get_for_update(conn, channel_pk)?
                    .ok_or(LifecycleError::NoSuchChannel(channel_pk))?;

                let sessions = db::work_sessions::list_active_for_channel(conn, channel_pk)?;
                let now = OffsetDateTime::now_utc();
                let mut channel = channel;
                for session in sessions {
                    let accrual = tracker::complete_session(conn, &channel, &session, now)?;
                    channel.off_chain_accumulated_balance += accrual.earned;
                }

                Ok::<_, LifecycleError>(channel)
            })
        })
        .await?
    }

    /// Marks a pending channel failed and records the failed create in the
    /// audit trail. Operator support is required to reconcile from here.
    async fn fail_create(
        &self,
        channel_pk: i32,
        tx_hash: Option<String>,
        result_code: Option<&'static str>,
    ) -> Result<(), LifecycleError> {
        tracing::warn!(
            channel_id = channel_pk,
            result_code = ?result_code,
            "Marking channel create failed"
        );

        let pool = self.pool.clone();
        spawn_blocking(move || -> Result<(), LifecycleError> {
            let mut conn = pool.get()?;
            conn.transaction(|conn| {
                db::channels::mark_failed_create(conn, channel_pk)?;
                db::payments::insert(
                    conn,
                    NewPaymentEvent {
                        channel_id: channel_pk,
                        tx_hash: tx_hash.unwrap_or_default(),
                        kind: PaymentKind::Create,
                        amount_drops: None,
                        result_code: result_code.map(|code| code.to_string()),
                        ledger_index: None,
                    },
                )?;
                Ok(())
            })
        })
        .await??;

        Ok(())
    }

    async fn resolve_tx_hash(
        &self,
        tx_hash: Option<String>,
        payload_ref: Option<Uuid>,
    ) -> Result<String, LifecycleError> {
        if let Some(tx_hash) = tx_hash {
            return Ok(tx_hash);
        }

        let payload_ref = payload_ref.ok_or_else(|| {
            LifecycleError::InvalidParameters(
                "either tx_hash or payload_ref is required".to_string(),
            )
        })?;

        let outcome = self.gateway.await_result(payload_ref).await?;
        Ok(outcome.tx_hash)
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

fn drops_str_to_native(drops: &str) -> Result<Decimal, LifecycleError> {
    let drops: u64 = drops
        .parse()
        .context("Malformed drops amount from the ledger")?;
    Ok(xahau_client::time::drops_to_native(drops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::testing::account_info;
    use crate::testing::MockLedger;
    use crate::testing::DESTINATION;
    use crate::testing::SOURCE;
    use payroll_commons::NetworkTag;
    use rust_decimal_macros::dec;

    fn lifecycle_with_gateway(ledger: Arc<MockLedger>, gateway: Arc<SigningGateway>) -> Lifecycle {
        let manager = ConnectionManager::<PgConnection>::new("postgres://unused");
        let pool = Pool::builder().build_unchecked(manager);
        let (notifier, _receiver) = mpsc::channel(8);

        Lifecycle::new(
            pool,
            ledger.clone(),
            gateway,
            ChannelIdResolver::new(ledger.clone(), Vec::new()),
            ClosureValidator::new(ledger),
            notifier,
            86_400,
            86_400,
        )
    }

    fn lifecycle_with(ledger: Arc<MockLedger>) -> Lifecycle {
        let gateway = Arc::new(SigningGateway::new(
            NetworkTag::XahauTestnet,
            std::time::Duration::from_secs(300),
            payroll_commons::WalletProvider::ManualSeed,
        ));
        lifecycle_with_gateway(ledger, gateway)
    }

    fn create_params() -> CreateChannelParams {
        CreateChannelParams {
            organization_wallet: SOURCE.to_string(),
            worker_wallet: DESTINATION.to_string(),
            job_name: Some("Field survey".to_string()),
            hourly_rate: dec!(15),
            escrow_amount: dec!(240),
            settle_delay_seconds: Some(3600),
            cancel_after_seconds: None,
            wallet_provider: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_an_unfunded_worker_wallet() {
        // The mock ledger knows no accounts, so the destination lookup
        // comes back NotFound and nothing is submitted for signing.
        let lifecycle = lifecycle_with(Arc::new(MockLedger::new()));

        let result = lifecycle.create_channel(create_params()).await;

        match result {
            Err(LifecycleError::DestinationInactive(wallet)) => {
                assert_eq!(wallet, DESTINATION);
            }
            other => panic!("expected DestinationInactive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_rejects_a_negative_hourly_rate() {
        let lifecycle = lifecycle_with(Arc::new(MockLedger::new()));
        let params = CreateChannelParams {
            hourly_rate: dec!(-1),
            ..create_params()
        };

        let result = lifecycle.create_channel(params).await;

        assert!(matches!(result, Err(LifecycleError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn create_with_a_funded_wallet_passes_the_destination_check() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_account_info(Ok(account_info(25_000_000)));
        let lifecycle = lifecycle_with(ledger);

        // No wallet provider is registered, so the flow stops at the
        // gateway; the point is that it got past the destination check.
        let result = lifecycle.create_channel(create_params()).await;

        assert!(matches!(
            result,
            Err(LifecycleError::Gateway(GatewayError::Provider(_)))
        ));
    }

    struct RejectsSigning;

    #[async_trait::async_trait]
    impl crate::gateway::WalletApi for RejectsSigning {
        async fn prepare_sign(
            &self,
            _tx: &UnsignedTransaction,
            _account: &str,
            _network: NetworkTag,
        ) -> Result<crate::gateway::PreparedPayload, GatewayError> {
            Ok(crate::gateway::PreparedPayload {
                payload_ref: Uuid::new_v4(),
                follow_up: None,
            })
        }

        async fn await_result(
            &self,
            _payload_ref: Uuid,
        ) -> Result<crate::gateway::SignedOutcome, GatewayError> {
            Err(GatewayError::Rejected)
        }

        async fn cancel(&self, _payload_ref: Uuid) {}
    }

    struct NeverSigns;

    #[async_trait::async_trait]
    impl crate::gateway::WalletApi for NeverSigns {
        async fn prepare_sign(
            &self,
            _tx: &UnsignedTransaction,
            _account: &str,
            _network: NetworkTag,
        ) -> Result<crate::gateway::PreparedPayload, GatewayError> {
            Ok(crate::gateway::PreparedPayload {
                payload_ref: Uuid::new_v4(),
                follow_up: None,
            })
        }

        async fn await_result(
            &self,
            _payload_ref: Uuid,
        ) -> Result<crate::gateway::SignedOutcome, GatewayError> {
            futures::future::pending().await
        }

        async fn cancel(&self, _payload_ref: Uuid) {}
    }

    fn create_template() -> UnsignedTransaction {
        UnsignedTransaction::PaymentChannelCreate(PaymentChannelCreate {
            account: SOURCE.to_string(),
            destination: DESTINATION.to_string(),
            amount: "240000000".to_string(),
            settle_delay: 3600,
            cancel_after: None,
            public_key: None,
        })
    }

    fn gateway_with(
        provider: Arc<dyn crate::gateway::WalletApi>,
        deadline: std::time::Duration,
    ) -> Arc<SigningGateway> {
        let mut gateway = SigningGateway::new(
            NetworkTag::XahauTestnet,
            deadline,
            payroll_commons::WalletProvider::ManualSeed,
        );
        gateway.register(payroll_commons::WalletProvider::ManualSeed, provider);
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn rejected_create_signing_takes_the_failed_create_path() {
        let gateway = gateway_with(
            Arc::new(RejectsSigning),
            std::time::Duration::from_secs(300),
        );
        let payload = gateway.prepare_sign(None, &create_template()).await.unwrap();
        let lifecycle = lifecycle_with_gateway(Arc::new(MockLedger::new()), gateway);

        let err = lifecycle
            .resolve_tx_hash(None, Some(payload.payload_ref))
            .await
            .unwrap_err();

        // confirm_create fails the channel for exactly these outcomes.
        assert!(signing_ceremony_failed(&err));
        assert_eq!(signing_failure_code(&err), "signing_rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_create_signing_takes_the_failed_create_path() {
        let gateway = gateway_with(Arc::new(NeverSigns), std::time::Duration::from_secs(300));
        let payload = gateway.prepare_sign(None, &create_template()).await.unwrap();
        let lifecycle = lifecycle_with_gateway(Arc::new(MockLedger::new()), gateway);

        let err = lifecycle
            .resolve_tx_hash(None, Some(payload.payload_ref))
            .await
            .unwrap_err();

        assert!(signing_ceremony_failed(&err));
        assert_eq!(signing_failure_code(&err), "signing_expired");
    }

    #[test]
    fn only_terminal_ceremony_outcomes_fail_the_create() {
        assert!(signing_ceremony_failed(&LifecycleError::Gateway(
            GatewayError::Rejected
        )));
        assert!(signing_ceremony_failed(&LifecycleError::Gateway(
            GatewayError::Expired
        )));
        assert!(signing_ceremony_failed(&LifecycleError::Gateway(
            GatewayError::Cancelled
        )));

        // Transient faults leave the channel pending; the confirmation can
        // be retried once the gateway or the node recovers.
        assert!(!signing_ceremony_failed(&LifecycleError::Gateway(
            GatewayError::Provider("service hiccup".to_string())
        )));
        assert!(!signing_ceremony_failed(&LifecycleError::Ledger(
            LedgerError::Unreachable("connection reset".to_string())
        )));
    }

    #[test]
    fn worker_close_always_removes_the_channel() {
        assert_eq!(
            expected_closure_kind(CallerKind::Destination, dec!(237)),
            ClosureKind::DestinationImmediate
        );
        assert_eq!(
            expected_closure_kind(CallerKind::Destination, Decimal::ZERO),
            ClosureKind::DestinationImmediate
        );
    }

    #[test]
    fn source_close_schedules_unless_escrow_is_exhausted() {
        assert_eq!(
            expected_closure_kind(CallerKind::Source, dec!(237)),
            ClosureKind::SourceScheduled
        );
        assert_eq!(
            expected_closure_kind(CallerKind::Source, Decimal::ZERO),
            ClosureKind::SourceImmediate
        );
    }

    #[test]
    fn zero_balance_close_omits_the_balance_field() {
        assert_eq!(close_balance_drops(Decimal::ZERO).unwrap(), None);
        assert_eq!(close_balance_drops(dec!(3)).unwrap(), Some(3_000_000));
    }

    #[test]
    fn sub_drop_balances_cannot_be_claimed() {
        assert!(close_balance_drops(dec!(0.0000001)).is_err());
    }
}
