use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// The supported signing ceremonies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletProvider {
    /// QR / deep-link signing through a hosted mobile wallet.
    MobileQr,
    /// The caller signs locally and reports the result back.
    ManualSeed,
    /// A browser extension signs and the frontend reports the result back.
    BrowserExtension,
}

impl fmt::Display for WalletProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletProvider::MobileQr => write!(f, "mobile_qr"),
            WalletProvider::ManualSeed => write!(f, "manual_seed"),
            WalletProvider::BrowserExtension => write!(f, "browser_extension"),
        }
    }
}

/// The network a signing payload is bound to. Providers reject a payload if
/// the user's device is connected to a different network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkTag {
    XahauMainnet,
    XahauTestnet,
}

impl fmt::Display for NetworkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkTag::XahauMainnet => write!(f, "xahau_mainnet"),
            NetworkTag::XahauTestnet => write!(f, "xahau_testnet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tags_are_stable() {
        assert_eq!(
            serde_json::to_string(&WalletProvider::MobileQr).unwrap(),
            r#""mobile_qr""#
        );
        assert_eq!(
            serde_json::from_str::<WalletProvider>(r#""browser_extension""#).unwrap(),
            WalletProvider::BrowserExtension
        );
        assert_eq!(
            serde_json::to_string(&NetworkTag::XahauTestnet).unwrap(),
            r#""xahau_testnet""#
        );
    }
}
