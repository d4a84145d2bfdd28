use crate::error::LifecycleError;
use payroll_commons::ChannelId;
use std::sync::Arc;
use std::time::Duration;
use xahau_client::LedgerApi;
use xahau_client::LedgerError;

/// Everything needed to pin down which channel a validated
/// `PaymentChannelCreate` produced.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub tx_hash: String,
    pub source: String,
    pub destination: String,
    pub expected_amount_drops: u64,
    pub expected_settle_delay_seconds: u32,
}

/// Recovers the ledger-assigned channel id for a create transaction.
///
/// The id is a deterministic function of the create transaction but only
/// observable after validation. The fast path reads it from the transaction
/// metadata; the fallback filters the source's channels by destination and
/// disambiguates on amount plus settle delay, so concurrent channels from
/// the same source cannot be misattributed. On exhaustion the caller gets
/// `ChannelIdUnresolved` and must not persist any placeholder.
pub struct ChannelIdResolver {
    ledger: Arc<dyn LedgerApi>,
    retry_schedule: Vec<Duration>,
}

impl ChannelIdResolver {
    pub fn new(ledger: Arc<dyn LedgerApi>, retry_schedule: Vec<Duration>) -> Self {
        Self {
            ledger,
            retry_schedule,
        }
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> Result<ChannelId, LifecycleError> {
        match self.ledger.fetch_tx(&request.tx_hash).await {
            Ok(tx) if tx.validated => {
                if let Some(id) = tx.created_pay_channel_id() {
                    return parse_channel_id(id);
                }
                tracing::debug!(
                    tx_hash = %request.tx_hash,
                    "Validated create has no PayChannel metadata, falling back to account_channels"
                );
            }
            Ok(_) => {
                tracing::debug!(tx_hash = %request.tx_hash, "Create transaction not validated yet");
            }
            Err(LedgerError::NotFound) => {
                tracing::debug!(tx_hash = %request.tx_hash, "Create transaction not indexed yet");
            }
            Err(e @ LedgerError::MethodUnsupported(_)) => {
                tracing::warn!("Degrading to account_channels lookup: {e}");
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("Transient error looking up create transaction: {e}");
            }
            Err(e) => return Err(e.into()),
        }

        for (attempt, delay) in self.retry_schedule.iter().enumerate() {
            tokio::time::sleep(*delay).await;

            let channels = match self
                .ledger
                .fetch_account_channels(&request.source, Some(&request.destination))
                .await
            {
                Ok(channels) => channels,
                Err(e) if e.is_transient() || matches!(e, LedgerError::MethodUnsupported(_)) => {
                    tracing::warn!(attempt, "Could not enumerate channels: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let expected_amount = request.expected_amount_drops.to_string();
            let mut matches = channels.iter().filter(|channel| {
                channel.amount == expected_amount
                    && channel.settle_delay == request.expected_settle_delay_seconds
            });

            match (matches.next(), matches.next()) {
                (Some(channel), None) => return parse_channel_id(&channel.channel_id),
                (Some(_), Some(_)) => {
                    tracing::warn!(
                        attempt,
                        "More than one channel matches amount and settle delay, retrying"
                    );
                }
                (None, _) => {
                    tracing::debug!(attempt, "No matching channel yet");
                }
            }
        }

        Err(LifecycleError::ChannelIdUnresolved {
            tx_hash: request.tx_hash.clone(),
        })
    }
}

fn parse_channel_id(id: &str) -> Result<ChannelId, LifecycleError> {
    ChannelId::new(id).map_err(|e| {
        LifecycleError::ChannelStateUnexpected(format!(
            "ledger returned a malformed channel id: {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::account_channel;
    use crate::testing::validated_create_tx;
    use crate::testing::MockLedger;
    use crate::testing::CHANNEL_ID;
    use crate::testing::DESTINATION;
    use crate::testing::SOURCE;
    use crate::testing::TX_HASH;

    fn request() -> ResolveRequest {
        ResolveRequest {
            tx_hash: TX_HASH.to_string(),
            source: SOURCE.to_string(),
            destination: DESTINATION.to_string(),
            expected_amount_drops: 240_000_000,
            expected_settle_delay_seconds: 3600,
        }
    }

    fn schedule() -> Vec<Duration> {
        [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_from_transaction_metadata() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Ok(validated_create_tx(CHANNEL_ID)));
        let resolver = ChannelIdResolver::new(ledger, schedule());

        let channel_id = resolver.resolve(&request()).await.unwrap();

        assert_eq!(channel_id.as_str(), CHANNEL_ID);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_account_channels_disambiguation() {
        let ledger = Arc::new(MockLedger::new());
        // tx lookup misses; first enumeration is empty, the second carries
        // two channels of which exactly one matches amount + settle delay.
        ledger.push_tx(Err(LedgerError::NotFound));
        ledger.push_account_channels(Ok(Vec::new()));
        ledger.push_account_channels(Ok(vec![
            account_channel(
                "AAAA6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA0000",
                100_000_000,
                3600,
            ),
            account_channel(CHANNEL_ID, 240_000_000, 3600),
        ]));
        let resolver = ChannelIdResolver::new(ledger, schedule());

        let channel_id = resolver.resolve(&request()).await.unwrap();

        assert_eq!(channel_id.as_str(), CHANNEL_ID);
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_matches_are_never_returned() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Err(LedgerError::NotFound));
        for _ in 0..5 {
            ledger.push_account_channels(Ok(vec![
                account_channel(
                    "AAAA6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA0000",
                    240_000_000,
                    3600,
                ),
                account_channel(CHANNEL_ID, 240_000_000, 3600),
            ]));
        }
        let resolver = ChannelIdResolver::new(ledger, schedule());

        let result = resolver.resolve(&request()).await;

        assert!(matches!(
            result,
            Err(LifecycleError::ChannelIdUnresolved { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_a_typed_failure() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Err(LedgerError::NotFound));
        let resolver = ChannelIdResolver::new(ledger, schedule());

        let result = resolver.resolve(&request()).await;

        match result {
            Err(LifecycleError::ChannelIdUnresolved { tx_hash }) => {
                assert_eq!(tx_hash, TX_HASH);
            }
            other => panic!("expected ChannelIdUnresolved, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_enumeration_errors_do_not_abort_the_budget() {
        let ledger = Arc::new(MockLedger::new());
        ledger.push_tx(Err(LedgerError::NotFound));
        ledger.push_account_channels(Err(LedgerError::Unreachable("reset".to_string())));
        ledger.push_account_channels(Ok(vec![account_channel(CHANNEL_ID, 240_000_000, 3600)]));
        let resolver = ChannelIdResolver::new(ledger, schedule());

        let channel_id = resolver.resolve(&request()).await.unwrap();

        assert_eq!(channel_id.as_str(), CHANNEL_ID);
    }
}
