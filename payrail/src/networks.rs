//! Network families, EVM chain IDs, and the token catalog.
//!
//! Payment requirements and envelopes name networks by their human-readable
//! x402 V1 identifiers ("base-sepolia", "solana-devnet", ...). This module
//! maps those names to a chain family, an EIP-155 chain ID where applicable,
//! and the token deployments (contract address or mint, decimals, EIP-712
//! domain data) a payer or resource server can price in.

use serde::{Deserialize, Serialize};

/// The chain family a network belongs to, selecting wire shapes and
/// signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFamily {
    /// Solana-style networks: Ed25519 keys, Base58 addresses, opaque
    /// serialized transactions.
    Solana,
    /// EVM networks: secp256k1 accounts, hex addresses, ERC-3009
    /// authorizations.
    Evm,
}

impl NetworkFamily {
    /// Classifies a network identifier by family.
    ///
    /// Any identifier containing "solana" (case-insensitive) is Solana;
    /// everything else is treated as EVM.
    #[must_use]
    pub fn of(network: &str) -> Self {
        if network.to_ascii_lowercase().contains("solana") {
            Self::Solana
        } else {
            Self::Evm
        }
    }
}

/// Deployment environment, selecting main-network or test-network token
/// deployments and network aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Main networks with real value.
    Production,
    /// Test networks (Sepolia-family chains, Solana devnet).
    #[default]
    Test,
}

/// Base Mainnet chain ID.
pub const BASE_MAINNET: u64 = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: u64 = 84532;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: u64 = 1;

/// Ethereum Sepolia (testnet) chain ID.
pub const ETHEREUM_SEPOLIA: u64 = 11_155_111;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: u64 = 137;

/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: u64 = 80002;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: u64 = 43114;

/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: u64 = 43113;

/// Looks up the EIP-155 chain ID for a V1 network name.
///
/// Returns `None` for unknown names and for Solana-family networks, which
/// have no EIP-155 identity.
#[must_use]
pub fn evm_chain_id(network: &str) -> Option<u64> {
    match network.to_ascii_lowercase().as_str() {
        "base" => Some(BASE_MAINNET),
        "base-sepolia" => Some(BASE_SEPOLIA),
        "ethereum" => Some(ETHEREUM_MAINNET),
        "sepolia" => Some(ETHEREUM_SEPOLIA),
        "polygon" => Some(POLYGON_MAINNET),
        "polygon-amoy" => Some(POLYGON_AMOY),
        "avalanche" => Some(AVALANCHE_MAINNET),
        "avalanche-fuji" => Some(AVALANCHE_FUJI),
        _ => None,
    }
}

/// A token deployment on a specific network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDeployment {
    /// V1 network name the token is deployed on.
    pub network: &'static str,
    /// Lower-case token symbol ("usdc").
    pub symbol: &'static str,
    /// Contract address (EVM, EIP-55) or mint address (Solana, Base58).
    pub asset: &'static str,
    /// Token decimals; amounts are handled in atomic units of 10^-decimals.
    pub decimals: u8,
    /// EIP-712 domain name for ERC-3009 signing; `None` on Solana.
    pub eip712_name: Option<&'static str>,
    /// EIP-712 domain version for ERC-3009 signing; `None` on Solana.
    pub eip712_version: Option<&'static str>,
}

/// Default EIP-712 domain name for USDC.
pub const USDC_NAME: &str = "USD Coin";

/// Default EIP-712 domain version for USDC.
pub const USDC_VERSION: &str = "2";

/// Default token decimals for USDC on every supported network.
pub const USDC_DECIMALS: u8 = 6;

const fn usdc_evm(network: &'static str, asset: &'static str) -> TokenDeployment {
    TokenDeployment {
        network,
        symbol: "usdc",
        asset,
        decimals: USDC_DECIMALS,
        eip712_name: Some(USDC_NAME),
        eip712_version: Some(USDC_VERSION),
    }
}

const fn usdc_solana(network: &'static str, mint: &'static str) -> TokenDeployment {
    TokenDeployment {
        network,
        symbol: "usdc",
        asset: mint,
        decimals: USDC_DECIMALS,
        eip712_name: None,
        eip712_version: None,
    }
}

/// Token deployments on main networks.
pub static PRODUCTION_TOKENS: &[TokenDeployment] = &[
    usdc_evm("base", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
    usdc_evm("ethereum", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    usdc_evm("polygon", "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
    usdc_evm("avalanche", "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
    usdc_solana("solana", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
];

/// Token deployments on test networks.
pub static TEST_TOKENS: &[TokenDeployment] = &[
    usdc_evm("base-sepolia", "0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
    usdc_evm("polygon-amoy", "0x41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF"),
    usdc_evm("avalanche-fuji", "0x5425890298aed601595a70AB815c96711a31Bc65"),
    usdc_solana("solana-devnet", "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
];

/// Returns the token catalog for an environment.
#[must_use]
pub fn catalog(env: Environment) -> &'static [TokenDeployment] {
    match env {
        Environment::Production => PRODUCTION_TOKENS,
        Environment::Test => TEST_TOKENS,
    }
}

/// Finds a token deployment by network and symbol, case-insensitively.
#[must_use]
pub fn find_token(env: Environment, network: &str, symbol: &str) -> Option<&'static TokenDeployment> {
    catalog(env).iter().find(|deployment| {
        deployment.network.eq_ignore_ascii_case(network)
            && deployment.symbol.eq_ignore_ascii_case(symbol)
    })
}

/// Folds a generic network alias to the concrete network id for the
/// environment.
///
/// Payer rules may name the chain generically ("solana", "base"); in the
/// test environment those fold to the corresponding test network. Already
/// concrete names pass through lower-cased.
#[must_use]
pub fn canonical_network(env: Environment, network: &str) -> String {
    let lower = network.to_ascii_lowercase();
    if env == Environment::Test {
        return match lower.as_str() {
            "solana" => "solana-devnet".to_owned(),
            "base" => "base-sepolia".to_owned(),
            "ethereum" => "sepolia".to_owned(),
            "polygon" => "polygon-amoy".to_owned(),
            "avalanche" => "avalanche-fuji".to_owned(),
            _ => lower,
        };
    }
    lower
}
