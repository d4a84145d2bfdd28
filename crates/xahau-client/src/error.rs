use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the node client.
///
/// `MethodUnsupported` is kept distinct from `Node` so that callers can
/// degrade gracefully when talking to a node that lacks a command instead
/// of aborting their whole operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger node unreachable: {0}")]
    Unreachable(String),
    #[error("ledger node does not support the `{0}` command")]
    MethodUnsupported(String),
    #[error("requested object does not exist on the ledger")]
    NotFound,
    #[error("ledger node returned `{0}`")]
    Node(String),
    #[error("ledger request timed out after {0:?}")]
    Timeout(Duration),
}

impl LedgerError {
    /// Whether a retry with the same arguments can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unreachable(_) | LedgerError::Timeout(_))
    }

    pub(crate) fn from_node_code(command: &str, code: &str) -> Self {
        match code {
            "txnNotFound" | "entryNotFound" | "objectNotFound" | "actNotFound" => {
                LedgerError::NotFound
            }
            "unknownCmd" | "noPermission" => LedgerError::MethodUnsupported(command.to_string()),
            other => LedgerError::Node(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_codes_map_to_distinct_kinds() {
        assert!(matches!(
            LedgerError::from_node_code("tx", "txnNotFound"),
            LedgerError::NotFound
        ));
        assert!(matches!(
            LedgerError::from_node_code("account_channels", "unknownCmd"),
            LedgerError::MethodUnsupported(_)
        ));
        assert!(matches!(
            LedgerError::from_node_code("submit", "amendmentBlocked"),
            LedgerError::Node(_)
        ));
    }

    #[test]
    fn only_network_failures_are_transient() {
        assert!(LedgerError::Unreachable("connection reset".to_string()).is_transient());
        assert!(LedgerError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(!LedgerError::NotFound.is_transient());
        assert!(!LedgerError::Node("tecNO_DST".to_string()).is_transient());
    }
}
