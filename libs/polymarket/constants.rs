//! Polymarket CTF Exchange constants
//!
//! Contract addresses and EIP-712 domain constants for Polygon Mainnet.

use ethers::types::Address;

/// Chain ID for Polygon Mainnet
pub const POLYGON_CHAIN_ID: u64 = 137;

/// CTF Exchange contract address (regular markets)
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

/// CTF Exchange contract address (neg_risk markets)
pub const NEG_RISK_CTF_EXCHANGE: &str = "0xC5d563A36AE78145C45a50134d48A1215220f80a";

/// Zero address (for public orders)
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// EIP-712 domain name for CTF Exchange
pub const EIP712_DOMAIN_NAME: &str = "Polymarket CTF Exchange";

/// EIP-712 domain version
pub const EIP712_DOMAIN_VERSION: &str = "1";

/// EOA signature type (direct wallet signing)
pub const SIGNATURE_TYPE_EOA: u8 = 0;

/// POLY_PROXY signature type (CREATE2 proxy wallet)
pub const SIGNATURE_TYPE_POLY_PROXY: u8 = 1;

/// Buy side (0)
pub const SIDE_BUY: u8 = 0;

/// Sell side (1)
pub const SIDE_SELL: u8 = 1;

/// USDC / outcome tokens carry 6 decimal places
pub const DECIMAL_MULTIPLIER: u64 = 1_000_000;

/// TTL stamped on marketable (IOC) orders; GTC orders carry expiration 0
pub const IOC_EXPIRATION_SECS: u64 = 60;

/// Public REST endpoint for the CLOB
pub const CLOB_BASE_URL: &str = "https://clob.polymarket.com";

/// Gamma discovery API
pub const GAMMA_BASE_URL: &str = "https://gamma-api.polymarket.com";

/// Data API (positions)
pub const DATA_BASE_URL: &str = "https://data-api.polymarket.com";

/// Market channel WebSocket
pub const MARKET_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// User channel WebSocket
pub const USER_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/user";

/// Parse the exchange address for the market flavor
pub fn exchange_address(neg_risk: bool) -> Address {
    let addr = if neg_risk { NEG_RISK_CTF_EXCHANGE } else { CTF_EXCHANGE };
    addr.parse().expect("Invalid exchange address constant")
}

/// Parse the zero address
pub fn zero_address() -> Address {
    ZERO_ADDRESS.parse().expect("Invalid zero address constant")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parsing() {
        let _ = exchange_address(false);
        let _ = exchange_address(true);
        let _ = zero_address();
    }

    #[test]
    fn test_exchange_flavors_differ() {
        assert_ne!(exchange_address(false), exchange_address(true));
    }
}
