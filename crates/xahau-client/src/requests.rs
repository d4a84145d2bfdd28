use serde::Serialize;

/// The JSON-RPC commands the client issues over the WebSocket connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Submit {
        tx_blob: String,
    },
    Tx {
        transaction: String,
        binary: bool,
    },
    LedgerEntry {
        payment_channel: String,
        ledger_index: String,
    },
    AccountChannels {
        account: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        destination_account: Option<String>,
        ledger_index: String,
    },
    AccountInfo {
        account: String,
        ledger_index: String,
    },
}

impl Request {
    pub fn command(&self) -> &'static str {
        match self {
            Request::Submit { .. } => "submit",
            Request::Tx { .. } => "tx",
            Request::LedgerEntry { .. } => "ledger_entry",
            Request::AccountChannels { .. } => "account_channels",
            Request::AccountInfo { .. } => "account_info",
        }
    }
}

/// A request with the multiplexing id the node echoes back in its response.
#[derive(Debug, Serialize)]
pub struct RequestEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub request: Request,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_channels_serializes_with_destination_filter() {
        let envelope = RequestEnvelope {
            id: 7,
            request: Request::AccountChannels {
                account: "rNGOEscrowWalletxxxxxxxxxxxxxxxxxx".to_string(),
                destination_account: Some("rWorkerWalletxxxxxxxxxxxxxxxxxxxxx".to_string()),
                ledger_index: "validated".to_string(),
            },
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["command"], "account_channels");
        assert_eq!(json["account"], "rNGOEscrowWalletxxxxxxxxxxxxxxxxxx");
        assert_eq!(
            json["destination_account"],
            "rWorkerWalletxxxxxxxxxxxxxxxxxxxxx"
        );
    }

    #[test]
    fn ledger_entry_uses_the_payment_channel_selector() {
        let envelope = RequestEnvelope {
            id: 1,
            request: Request::LedgerEntry {
                payment_channel:
                    "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198".to_string(),
                ledger_index: "validated".to_string(),
            },
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["command"], "ledger_entry");
        assert_eq!(
            json["payment_channel"],
            "C1AE6DDDEEC05CF2978C0BAD6FE302948E9533691DC749DCDD3B9E5992CA6198"
        );
    }
}
