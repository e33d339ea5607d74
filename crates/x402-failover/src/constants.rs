use alloy::primitives::{address, Address};

/// x402 protocol version spoken to facilitators.
pub const X402_VERSION: u32 = 1;

/// x402 scheme name for exact-amount payments.
pub const SCHEME_NAME: &str = "exact";

/// Base Sepolia network identifier.
pub const BASE_SEPOLIA: &str = "base-sepolia";

/// Base mainnet network identifier.
pub const BASE_MAINNET: &str = "base";

/// USDC on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// USDC on Base mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4C7C32D4f71b54bdA02913");

/// USDC has 6 decimal places.
pub const TOKEN_DECIMALS: u32 = 6;

/// Per-attempt timeout applied when a facilitator does not set its own.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Probe timeout. Shorter than the operational timeout since probes should be cheap.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;

pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;

pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub const DEFAULT_MAX_LOG_ENTRIES: usize = 1_000;

/// Weight of the newest sample in the response-time moving average.
pub const EMA_WEIGHT: f64 = 0.3;

/// `Retry-After` hint (seconds) sent when every facilitator is unavailable.
pub const RETRY_AFTER_SECS: u64 = 60;

/// Pseudo facilitator id for failures that happened before any candidate was tried.
pub const NO_FACILITATOR_ID: &str = "none";

/// Pseudo facilitator id for failures that span every candidate.
pub const ALL_FACILITATORS_ID: &str = "all";

/// Resolve the USDC asset for a network name, if it is one we know.
pub fn usdc_for_network(network: &str) -> Option<Address> {
    match network {
        BASE_SEPOLIA => Some(USDC_BASE_SEPOLIA),
        BASE_MAINNET => Some(USDC_BASE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usdc_for_known_networks() {
        assert_eq!(usdc_for_network("base-sepolia"), Some(USDC_BASE_SEPOLIA));
        assert_eq!(usdc_for_network("base"), Some(USDC_BASE));
        assert_eq!(usdc_for_network("eip155:42431"), None);
    }
}
