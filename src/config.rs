//! Engine Configuration
//!
//! Parameters for the rebalance engine, the limit governor's breach policy,
//! the reward emission and the optional chain inspector. Loaded from the
//! environment (`.env` supported) or a TOML file.

use alloy_primitives::{Address, U256};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::governance::LimitBreachPolicy;

/// 1 gwei in wei
const GWEI: u64 = 1_000_000_000;

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // ========== Network Settings ==========
    /// RPC URL used by the chain inspector
    pub rpc_url: String,

    // ========== Rebalance Settings ==========
    /// Value-per-share move (either direction) flagged as an anomaly
    pub max_value_jump_bps: u64,

    /// Behaviour when a deposit exceeds the pool's headroom
    pub limit_breach_policy: LimitBreachPolicy,

    /// Risk profile the vault invests under
    pub risk_profile: u32,

    // ========== Gas Reimbursement ==========
    /// Estimated gas per executed instruction
    pub gas_per_instruction: u64,

    /// Gas price used for reimbursement accounting
    pub gas_price_gwei: u64,

    // ========== Harvest ==========
    /// Slippage tolerated when swapping rewards, basis points
    pub harvest_slippage_bps: u64,

    // ========== Rewards ==========
    /// Reward tokens emitted per second across all tiers (wei)
    pub total_emission_rate: u64,

    // ========== Anomaly Log ==========
    pub anomaly_log: bool,
    pub anomaly_log_path: String,

    // ========== Roles ==========
    pub governance_address: Option<String>,
    pub operator_address: Option<String>,
    pub finance_operator_address: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),

            max_value_jump_bps: env_or("MAX_VALUE_JUMP_BPS", defaults.max_value_jump_bps),
            limit_breach_policy: match env::var("LIMIT_BREACH_POLICY")
                .unwrap_or_else(|_| "cap".to_string())
                .to_lowercase()
                .as_str()
            {
                "reject" => LimitBreachPolicy::Reject,
                _ => LimitBreachPolicy::Cap,
            },
            risk_profile: env_or("RISK_PROFILE", defaults.risk_profile),

            gas_per_instruction: env_or("GAS_PER_INSTRUCTION", defaults.gas_per_instruction),
            gas_price_gwei: env_or("GAS_PRICE_GWEI", defaults.gas_price_gwei),

            harvest_slippage_bps: env_or("HARVEST_SLIPPAGE_BPS", defaults.harvest_slippage_bps),

            total_emission_rate: env_or("TOTAL_EMISSION_RATE", defaults.total_emission_rate),

            anomaly_log: env_or("ANOMALY_LOG", defaults.anomaly_log),
            anomaly_log_path: env::var("ANOMALY_LOG_PATH").unwrap_or(defaults.anomaly_log_path),

            governance_address: env::var("GOVERNANCE_ADDRESS").ok(),
            operator_address: env::var("OPERATOR_ADDRESS").ok(),
            finance_operator_address: env::var("FINANCE_OPERATOR_ADDRESS").ok(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Gas price in wei
    pub fn gas_price_wei(&self) -> U256 {
        U256::from(self.gas_price_gwei) * U256::from(GWEI)
    }

    fn parse_role(value: &Option<String>, name: &str) -> Result<Option<Address>> {
        value
            .as_deref()
            .map(|s| {
                Address::from_str(s)
                    .map_err(|e| eyre::eyre!("Invalid {} '{}': {}", name, s, e))
            })
            .transpose()
    }

    pub fn governance(&self) -> Result<Option<Address>> {
        Self::parse_role(&self.governance_address, "GOVERNANCE_ADDRESS")
    }

    pub fn operator(&self) -> Result<Option<Address>> {
        Self::parse_role(&self.operator_address, "OPERATOR_ADDRESS")
    }

    pub fn finance_operator(&self) -> Result<Option<Address>> {
        Self::parse_role(&self.finance_operator_address, "FINANCE_OPERATOR_ADDRESS")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_value_jump_bps == 0 || self.max_value_jump_bps > 10_000 {
            return Err(eyre::eyre!(
                "MAX_VALUE_JUMP_BPS must be between 1 and 10000 (currently {})",
                self.max_value_jump_bps
            ));
        }
        if self.harvest_slippage_bps > 10_000 {
            return Err(eyre::eyre!(
                "HARVEST_SLIPPAGE_BPS cannot exceed 10000 (currently {})",
                self.harvest_slippage_bps
            ));
        }
        if self.gas_per_instruction == 0 {
            return Err(eyre::eyre!("GAS_PER_INSTRUCTION must be positive"));
        }
        if self.anomaly_log && self.anomaly_log_path.is_empty() {
            return Err(eyre::eyre!("ANOMALY_LOG is enabled but ANOMALY_LOG_PATH is empty"));
        }

        self.governance()?;
        self.operator()?;
        self.finance_operator()?;

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let role = |value: &Option<String>| {
            if value.is_some() {
                "✓ Configured"
            } else {
                "✗ Not Set"
            }
        };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              YIELD ROUTER - CONFIGURATION                  ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ REBALANCE                                                  ║");
        println!("║ • Max Value Jump:  {:>36} bps ║", self.max_value_jump_bps);
        println!("║ • Breach Policy:   {:^40} ║", self.limit_breach_policy);
        println!("║ • Risk Profile:    {:^40} ║", self.risk_profile);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ GAS REIMBURSEMENT                                          ║");
        println!("║ • Gas/Instruction: {:>40} ║", self.gas_per_instruction);
        println!("║ • Gas Price:       {:>35} gwei ║", self.gas_price_gwei);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ REWARDS                                                    ║");
        println!("║ • Emission Rate:   {:>34} wei/s ║", self.total_emission_rate);
        println!("║ • Harvest Slip:    {:>36} bps ║", self.harvest_slippage_bps);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ ROLES                                                      ║");
        println!("║ • Governance:      {:^40} ║", role(&self.governance_address));
        println!("║ • Operator:        {:^40} ║", role(&self.operator_address));
        println!("║ • Finance Op:      {:^40} ║", role(&self.finance_operator_address));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ • Anomaly Log:     {:^40} ║",
            if self.anomaly_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            max_value_jump_bps: 100,
            limit_breach_policy: LimitBreachPolicy::Cap,
            risk_profile: 1,
            gas_per_instruction: 60_000,
            gas_price_gwei: 30,
            harvest_slippage_bps: 50,
            total_emission_rate: 1_000_000_000_000_000_000,
            anomaly_log: false,
            anomaly_log_path: "./logs/value_anomalies.log".to_string(),
            governance_address: None,
            operator_address: None,
            finance_operator_address: None,
        }
    }
}

// ============================================
// ANOMALY LOGGER
// ============================================

use chrono::{DateTime, Utc};
use std::io::Write;

/// A value-per-share jump beyond tolerance, recorded after a committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub timestamp: DateTime<Utc>,
    pub vault: String,
    pub strategy: Option<String>,
    pub previous_value_per_share: String,
    pub value_per_share: String,
    pub jump_bps: u64,
    pub ledger_timestamp: u64,
}

impl AnomalyRecord {
    /// Append this record to a JSON-lines file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.limit_breach_policy, LimitBreachPolicy::Cap);
        assert!(config.validate().is_ok());
        assert_eq!(config.gas_price_wei(), U256::from(30_000_000_000u64));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig {
            max_value_jump_bps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            governance_address: Some("not-an-address".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_policy() {
        let dir = std::env::temp_dir().join(format!("yield-router-cfg-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.toml");

        let config = EngineConfig {
            limit_breach_policy: LimitBreachPolicy::Reject,
            operator_address: Some(format!("{}", Address::repeat_byte(0x61))),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = EngineConfig::from_file(&path).unwrap();

        assert_eq!(loaded.limit_breach_policy, LimitBreachPolicy::Reject);
        assert_eq!(loaded.operator().unwrap(), Some(Address::repeat_byte(0x61)));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_anomaly_record_appends_json_lines() {
        let dir = std::env::temp_dir().join(format!("yield-router-log-{}", std::process::id()));
        let path = dir.join("anomalies.log");
        let record = AnomalyRecord {
            timestamp: Utc::now(),
            vault: "0xvault".to_string(),
            strategy: None,
            previous_value_per_share: "1000".to_string(),
            value_per_share: "1200".to_string(),
            jump_bps: 2_000,
            ledger_timestamp: 42,
        };
        record.append_to_file(&path).unwrap();
        record.append_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AnomalyRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, record);
        fs::remove_dir_all(&dir).ok();
    }
}
