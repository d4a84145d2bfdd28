use crate::error::LifecycleError;
use payroll_commons::ChannelId;
use std::fmt;
use std::sync::Arc;
use xahau_client::LedgerApi;
use xahau_client::LedgerError;

/// How a closing claim is expected to land on the ledger.
///
/// A destination-signed close removes the channel immediately. A
/// source-signed close on a funded channel only schedules an `Expiration`;
/// with zero remaining escrow it removes the channel right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureKind {
    SourceScheduled,
    DestinationImmediate,
    SourceImmediate,
}

impl fmt::Display for ClosureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosureKind::SourceScheduled => write!(f, "source_scheduled"),
            ClosureKind::DestinationImmediate => write!(f, "destination_immediate"),
            ClosureKind::SourceImmediate => write!(f, "source_immediate"),
        }
    }
}

/// What the validator established about a submitted closing claim.
#[derive(Debug, Clone)]
pub struct ClosureValidation {
    pub tx_hash: String,
    pub expected: ClosureKind,
    /// How the closure actually landed. Differs from `expected` only on the
    /// `SourceImmediate` path, where the ledger may have scheduled instead.
    pub observed: ClosureKind,
    /// True when the channel's ledger entry no longer exists.
    pub channel_gone: bool,
    pub expiration_ripple_time: Option<i64>,
    pub engine_result: String,
    pub ledger_index: Option<i64>,
}

/// Verifies that a `PaymentChannelClaim` validated with `tesSUCCESS` and
/// that the channel entry matches the expected closure kind. Runs entirely
/// against the ledger; the caller commits the transition afterwards.
pub struct ClosureValidator {
    ledger: Arc<dyn LedgerApi>,
}

impl ClosureValidator {
    pub fn new(ledger: Arc<dyn LedgerApi>) -> Self {
        Self { ledger }
    }

    pub async fn validate(
        &self,
        channel_id: &ChannelId,
        tx_hash: &str,
        expected: ClosureKind,
    ) -> Result<ClosureValidation, LifecycleError> {
        let tx = match self.ledger.fetch_tx(tx_hash).await {
            Ok(tx) => tx,
            Err(LedgerError::NotFound) => {
                return Err(LifecycleError::TransactionNotFinal {
                    tx_hash: tx_hash.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if !tx.validated {
            return Err(LifecycleError::TransactionNotFinal {
                tx_hash: tx_hash.to_string(),
            });
        }

        let engine_result = tx
            .transaction_result()
            .ok_or_else(|| {
                LifecycleError::ChannelStateUnexpected(
                    "validated transaction carries no metadata".to_string(),
                )
            })?
            .to_string();

        if !tx.is_success() {
            return Err(LifecycleError::TransactionFailed {
                code: engine_result,
            });
        }

        let entry = match self.ledger.fetch_channel_entry(channel_id.as_str()).await {
            Ok(entry) => Some(entry),
            Err(LedgerError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let (observed, channel_gone, expiration) = match (expected, entry) {
            (ClosureKind::DestinationImmediate, None) => {
                (ClosureKind::DestinationImmediate, true, None)
            }
            (ClosureKind::DestinationImmediate, Some(_)) => {
                return Err(LifecycleError::ChannelStateUnexpected(
                    "destination close validated but the channel entry still exists".to_string(),
                ))
            }
            (ClosureKind::SourceScheduled, Some(entry)) => match entry.expiration {
                Some(expiration) => (ClosureKind::SourceScheduled, false, Some(expiration)),
                None => {
                    return Err(LifecycleError::ChannelStateUnexpected(
                        "source close validated but no expiration was scheduled".to_string(),
                    ))
                }
            },
            (ClosureKind::SourceScheduled, None) => {
                return Err(LifecycleError::ChannelStateUnexpected(
                    "source close was expected to schedule expiration but the entry is gone"
                        .to_string(),
                ))
            }
            // Zero remaining escrow usually removes the entry immediately,
            // but a race with a last claim can leave a scheduled close.
            (ClosureKind::SourceImmediate, None) => (ClosureKind::SourceImmediate, true, None),
            (ClosureKind::SourceImmediate, Some(entry)) => match entry.expiration {
                Some(expiration) => (ClosureKind::SourceScheduled, false, Some(expiration)),
                None => {
                    return Err(LifecycleError::ChannelStateUnexpected(
                        "source close validated but the channel neither closed nor scheduled"
                            .to_string(),
                    ))
                }
            },
        };

        Ok(ClosureValidation {
            tx_hash: tx_hash.to_string(),
            expected,
            observed,
            channel_gone,
            expiration_ripple_time: expiration,
            engine_result,
            ledger_index: tx.ledger_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::channel_entry;
    use crate::testing::unvalidated_tx;
    use crate::testing::validated_tx;
    use crate::testing::MockLedger;
    use crate::testing::CHANNEL_ID;
    use crate::testing::TX_HASH;

    fn channel_id() -> ChannelId {
        ChannelId::new(CHANNEL_ID).unwrap()
    }

    #[tokio::test]
    async fn destination_close_requires_the_entry_to_be_gone() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Ok(validated_tx("tesSUCCESS")));
        ledger.push_channel_entry(Err(LedgerError::NotFound));
        let validator = ClosureValidator::new(ledger);

        let validation = validator
            .validate(&channel_id(), TX_HASH, ClosureKind::DestinationImmediate)
            .await
            .unwrap();

        assert!(validation.channel_gone);
        assert_eq!(validation.observed, ClosureKind::DestinationImmediate);
        assert_eq!(validation.engine_result, "tesSUCCESS");
    }

    #[tokio::test]
    async fn destination_close_with_surviving_entry_is_unexpected() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Ok(validated_tx("tesSUCCESS")));
        ledger.push_channel_entry(Ok(channel_entry(240_000_000, 3_000_000, None)));
        let validator = ClosureValidator::new(ledger);

        let result = validator
            .validate(&channel_id(), TX_HASH, ClosureKind::DestinationImmediate)
            .await;

        assert!(matches!(
            result,
            Err(LifecycleError::ChannelStateUnexpected(_))
        ));
    }

    #[tokio::test]
    async fn source_scheduled_close_surfaces_the_expiration() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Ok(validated_tx("tesSUCCESS")));
        ledger.push_channel_entry(Ok(channel_entry(240_000_000, 3_000_000, Some(750_003_600))));
        let validator = ClosureValidator::new(ledger);

        let validation = validator
            .validate(&channel_id(), TX_HASH, ClosureKind::SourceScheduled)
            .await
            .unwrap();

        assert!(!validation.channel_gone);
        assert_eq!(validation.expiration_ripple_time, Some(750_003_600));
    }

    #[tokio::test]
    async fn source_immediate_close_accepts_both_paths() {
        // Entry gone: escrow was zero.
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Ok(validated_tx("tesSUCCESS")));
        ledger.push_channel_entry(Err(LedgerError::NotFound));
        let validator = ClosureValidator::new(ledger);
        let validation = validator
            .validate(&channel_id(), TX_HASH, ClosureKind::SourceImmediate)
            .await
            .unwrap();
        assert!(validation.channel_gone);
        assert_eq!(validation.observed, ClosureKind::SourceImmediate);

        // Entry survived with expiration: treat as scheduled and tell the caller.
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Ok(validated_tx("tesSUCCESS")));
        ledger.push_channel_entry(Ok(channel_entry(240_000_000, 0, Some(750_003_600))));
        let validator = ClosureValidator::new(ledger);
        let validation = validator
            .validate(&channel_id(), TX_HASH, ClosureKind::SourceImmediate)
            .await
            .unwrap();
        assert!(!validation.channel_gone);
        assert_eq!(validation.observed, ClosureKind::SourceScheduled);
        assert_eq!(validation.expiration_ripple_time, Some(750_003_600));
    }

    #[tokio::test]
    async fn unvalidated_claim_is_not_final() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Ok(unvalidated_tx()));
        let validator = ClosureValidator::new(ledger);

        let result = validator
            .validate(&channel_id(), TX_HASH, ClosureKind::DestinationImmediate)
            .await;

        assert!(matches!(
            result,
            Err(LifecycleError::TransactionNotFinal { .. })
        ));
    }

    #[tokio::test]
    async fn failed_engine_result_is_reported_verbatim() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Ok(validated_tx("tecNO_PERMISSION")));
        let validator = ClosureValidator::new(ledger);

        let result = validator
            .validate(&channel_id(), TX_HASH, ClosureKind::SourceScheduled)
            .await;

        match result {
            Err(LifecycleError::TransactionFailed { code }) => {
                assert_eq!(code, "tecNO_PERMISSION");
            }
            other => panic!("expected TransactionFailed, got {other:?}"),
        }
    }
}
