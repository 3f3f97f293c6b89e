//! RPC endpoint configuration
//!
//! The endpoint for the configured network is resolved from the environment:
//! 1. Per-chain env var (ETH_RPC_URL, ARBITRUM_RPC_URL, ...) - highest priority
//! 2. ALCHEMY_API_KEY - builds the URL automatically
//! 3. INFURA_API_KEY - builds the URL where Infura serves the chain
//! 4. Public RPC fallback - rate limited, for testing only
//!
//! ```bash
//! export BASE_RPC_URL="https://base-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! ```

use super::Network;

/// RPC endpoint for the single chain trades settle on
#[derive(Debug, Clone)]
pub struct RpcConfig {
    url: String,
    chain_id: u64,
}

mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const ARBITRUM_RPC_URL: &str = "ARBITRUM_RPC_URL";
    pub const OPTIMISM_RPC_URL: &str = "OPTIMISM_RPC_URL";
    pub const BASE_RPC_URL: &str = "BASE_RPC_URL";

    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
    pub const INFURA_API_KEY: &str = "INFURA_API_KEY";
}

mod public_rpcs {
    pub const ETHEREUM: &str = "https://eth.llamarpc.com";
    pub const ARBITRUM: &str = "https://arb1.arbitrum.io/rpc";
    pub const OPTIMISM: &str = "https://mainnet.optimism.io";
    pub const BASE: &str = "https://mainnet.base.org";
}

impl RpcConfig {
    /// Resolve the RPC URL for `network` from environment variables
    pub fn from_env(network: Network) -> Self {
        let url_var = Self::url_var(network);

        if let Ok(url) = std::env::var(url_var) {
            tracing::debug!(var = url_var, "Using per-chain RPC URL");
            return Self::with_url(network, url);
        }

        if let Ok(key) = std::env::var(env_vars::ALCHEMY_API_KEY) {
            tracing::info!(network = network.name(), "Building RPC URL from ALCHEMY_API_KEY");
            return Self::with_url(network, Self::alchemy_url(network, &key));
        }

        if let Ok(key) = std::env::var(env_vars::INFURA_API_KEY) {
            // Infura doesn't serve Base
            if let Some(url) = Self::infura_url(network, &key) {
                tracing::info!(network = network.name(), "Building RPC URL from INFURA_API_KEY");
                return Self::with_url(network, url);
            }
        }

        tracing::warn!(
            network = network.name(),
            "No RPC configured, using public RPC (rate limited)"
        );
        Self::with_url(network, Self::public_url(network).to_string())
    }

    /// Create with an explicit RPC URL
    pub fn with_url(network: Network, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            chain_id: network.chain_id(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn url_var(network: Network) -> &'static str {
        match network {
            Network::Ethereum => env_vars::ETH_RPC_URL,
            Network::Arbitrum => env_vars::ARBITRUM_RPC_URL,
            Network::Optimism => env_vars::OPTIMISM_RPC_URL,
            Network::Base => env_vars::BASE_RPC_URL,
        }
    }

    fn alchemy_url(network: Network, key: &str) -> String {
        let host = match network {
            Network::Ethereum => "eth-mainnet",
            Network::Arbitrum => "arb-mainnet",
            Network::Optimism => "opt-mainnet",
            Network::Base => "base-mainnet",
        };
        format!("https://{}.g.alchemy.com/v2/{}", host, key)
    }

    fn infura_url(network: Network, key: &str) -> Option<String> {
        let host = match network {
            Network::Ethereum => "mainnet",
            Network::Arbitrum => "arbitrum-mainnet",
            Network::Optimism => "optimism-mainnet",
            Network::Base => return None,
        };
        Some(format!("https://{}.infura.io/v3/{}", host, key))
    }

    fn public_url(network: Network) -> &'static str {
        match network {
            Network::Ethereum => public_rpcs::ETHEREUM,
            Network::Arbitrum => public_rpcs::ARBITRUM,
            Network::Optimism => public_rpcs::OPTIMISM,
            Network::Base => public_rpcs::BASE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_url() {
        let config = RpcConfig::with_url(Network::Base, "https://custom.rpc");
        assert_eq!(config.url(), "https://custom.rpc");
        assert_eq!(config.chain_id(), 8453);
    }

    #[test]
    fn test_provider_urls() {
        assert_eq!(
            RpcConfig::alchemy_url(Network::Arbitrum, "k"),
            "https://arb-mainnet.g.alchemy.com/v2/k"
        );
        assert!(RpcConfig::infura_url(Network::Base, "k").is_none());
        assert_eq!(
            RpcConfig::infura_url(Network::Ethereum, "k").as_deref(),
            Some("https://mainnet.infura.io/v3/k")
        );
    }

    #[test]
    fn test_public_fallbacks() {
        assert_eq!(RpcConfig::public_url(Network::Ethereum), public_rpcs::ETHEREUM);
        assert_eq!(RpcConfig::public_url(Network::Base), public_rpcs::BASE);
    }
}
