//! Predict exchange constants
//!
//! Contract addresses and EIP-712 domain constants for BSC Mainnet. Every
//! market settles through one of four exchange contracts: the standard and
//! negRisk CTF exchanges, each with a yield-bearing-collateral flavor.

use ethers::types::{Address, H256};

/// Chain ID for BSC Mainnet
pub const BSC_CHAIN_ID: u64 = 56;

/// CTF Exchange (standard markets)
pub const CTF_EXCHANGE: &str = "0x754F861B32Cc0294C0eB8cb2bCEE1E79Cf1e67c9";

/// CTF Exchange (negRisk markets)
pub const NEG_RISK_CTF_EXCHANGE: &str = "0xa4C048ba1f18E9C1Aa574cfc5B1D7b73E9B0a7E2";

/// Yield-bearing CTF Exchange (standard markets)
pub const YIELD_CTF_EXCHANGE: &str = "0x3bD8e6dA5bD8CcdE1D8F1aA8c1C11C2aE2aC93dF";

/// Yield-bearing CTF Exchange (negRisk markets)
pub const YIELD_NEG_RISK_CTF_EXCHANGE: &str = "0xE3f70c2aE68b4A87E55cC1bE5C5D8DB12e85D9c4";

/// `OrderFilled(bytes32 indexed orderHash, address indexed maker, address indexed taker, ...)`
pub const ORDER_FILLED_TOPIC: &str =
    "0xd0a08e8c493f9c94f29311604c9de1b4e8c8d4c06bd0c789af57f2d65bfec0f6";

/// EIP-712 domain name shared by all four exchange contracts
pub const EIP712_DOMAIN_NAME: &str = "Predict CTF Exchange";

/// EIP-712 domain version
pub const EIP712_DOMAIN_VERSION: &str = "1";

/// EOA signature type
pub const SIGNATURE_TYPE_EOA: u8 = 0;

/// Smart-wallet signature type (orders funded by the smart wallet)
pub const SIGNATURE_TYPE_SMART_WALLET: u8 = 1;

/// Buy side (0)
pub const SIDE_BUY: u8 = 0;

/// Sell side (1)
pub const SIDE_SELL: u8 = 1;

/// Collateral and outcome tokens carry 18 decimal places
pub const TOKEN_DECIMALS: u32 = 18;

/// Public REST endpoint
pub const REST_BASE_URL: &str = "https://api.predict.fun";

/// Orderbook / wallet-event WebSocket
pub const WS_URL: &str = "wss://ws.predict.fun";

/// Zero address (public orders)
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Exchange contract for a market flavor
pub fn exchange_address(neg_risk: bool, yield_bearing: bool) -> Address {
    let addr = match (neg_risk, yield_bearing) {
        (false, false) => CTF_EXCHANGE,
        (true, false) => NEG_RISK_CTF_EXCHANGE,
        (false, true) => YIELD_CTF_EXCHANGE,
        (true, true) => YIELD_NEG_RISK_CTF_EXCHANGE,
    };
    addr.parse().expect("Invalid exchange address constant")
}

/// All four exchange contracts (for the on-chain log filter)
pub fn all_exchange_addresses() -> Vec<Address> {
    vec![
        exchange_address(false, false),
        exchange_address(true, false),
        exchange_address(false, true),
        exchange_address(true, true),
    ]
}

pub fn order_filled_topic() -> H256 {
    ORDER_FILLED_TOPIC
        .parse()
        .expect("Invalid OrderFilled topic constant")
}

pub fn zero_address() -> Address {
    ZERO_ADDRESS.parse().expect("Invalid zero address constant")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_parse() {
        assert_eq!(all_exchange_addresses().len(), 4);
        let _ = order_filled_topic();
        let _ = zero_address();
    }

    #[test]
    fn test_exchange_flavors_distinct() {
        let addresses = all_exchange_addresses();
        for i in 0..addresses.len() {
            for j in (i + 1)..addresses.len() {
                assert_ne!(addresses[i], addresses[j]);
            }
        }
    }
}
