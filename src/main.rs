//! Yield Router CLI
//!
//! Run with: cargo run -- demo
//!
//! - `demo`: scripted rebalance scenario on the sandbox ledger
//! - `hash`: token-set, step and strategy hashes for a step list
//! - `inspect`: live pool values over RPC
//! - `config`: print the effective configuration

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yield_router::adapters::valuation::WAD;
use yield_router::adapters::ProtocolFamily;
use yield_router::catalog::{step_hash, strategy_hash, tokens_hash, StrategyStep};
use yield_router::chain::{ChainInspector, PoolSnapshot, PoolTarget};
use yield_router::config::EngineConfig;
use yield_router::governance::Role;
use yield_router::ledger::LedgerView;
use yield_router::rewards::{RewardRateAllocator, SECONDS_PER_DAY, TIER_COUNT};
use yield_router::sandbox::{Sandbox, DAI, GOVERNANCE, OPERATOR, VAULT};
use yield_router::vault::{RebalanceReport, RouterContext, Vault};

const DEMO_USER: Address = Address::repeat_byte(0x0d);

#[derive(Parser)]
#[command(name = "yield-router", version, about = "Multi-venue yield routing engine")]
struct Cli {
    /// TOML configuration file; the environment (and .env) is used otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scripted rebalance scenario against the sandbox ledger
    Demo {
        /// Whole DAI deposited by the demo user
        #[arg(long, default_value_t = 10_000)]
        deposit: u64,
    },
    /// Compute token-set, step and strategy hashes
    Hash {
        #[arg(long, value_delimiter = ',', required = true)]
        tokens: Vec<Address>,
        /// `pool:output` or `pool:output:borrow`, in order
        #[arg(long = "step")]
        steps: Vec<String>,
    },
    /// Read live pool values over RPC
    Inspect {
        #[arg(long)]
        family: ProtocolFamily,
        /// `pool` or `pool:lp_token` (Curve), repeatable
        #[arg(long = "pool", required = true)]
        pools: Vec<String>,
    },
    /// Print the effective configuration
    Config,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🌾 YIELD ROUTER - Multi-Venue Strategy Engine").cyan().bold()
    );
    println!(
        "{}",
        style("    Compound | Aave V2 | Curve | ERC-4626").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

/// WAD-scaled amount with four decimals
fn fmt_units(value: U256) -> String {
    let whole = value / WAD;
    let frac = (value % WAD) / U256::from(100_000_000_000_000u64);
    format!("{}.{:04}", whole, u64::try_from(frac).unwrap_or(0))
}

fn parse_step(raw: &str) -> Result<StrategyStep> {
    let parts: Vec<&str> = raw.split(':').collect();
    let address = |s: &str| -> Result<Address> {
        s.parse()
            .map_err(|e| eyre!("invalid address '{}' in step '{}': {}", s, raw, e))
    };
    match parts.as_slice() {
        [pool, output] => Ok(StrategyStep::invest(address(pool)?, address(output)?)),
        [pool, output, "borrow"] => Ok(StrategyStep::borrow(address(pool)?, address(output)?)),
        _ => Err(eyre!("step '{}' must be pool:output[:borrow]", raw)),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or --config");
        return Err(e);
    }
    Ok(config)
}

fn print_report(label: &str, report: &RebalanceReport) {
    println!("{} {}", style("✓").green(), style(label).bold());
    println!(
        "   strategy:        {}",
        report
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "idle".to_string())
    );
    println!("   instructions:    {}", report.receipt.instruction_count());
    for instruction in report.receipt.batch.iter().take(3) {
        let text = instruction.to_string();
        let shown: String = text.chars().take(72).collect();
        println!("     {}…", style(shown).dim());
    }
    println!("   total value:     {} DAI", fmt_units(report.total_value));
    println!("   value/share:     {}", fmt_units(report.value_per_share));
    println!(
        "   settled:         {} deposits, {} withdrawals",
        report.deposits_settled, report.withdrawals_settled
    );
    println!("   gas charged:     {} wei", report.gas_charged);
    if let Some(anomaly) = &report.anomaly {
        println!(
            "   {} value/share moved {} bps",
            style("⚠️").yellow(),
            anomaly.jump_bps
        );
    }
    println!();
}

fn run_demo(config: &EngineConfig, deposit: u64) -> Result<()> {
    println!("{}", style("═══ SANDBOX REBALANCE SCENARIO ═══").blue().bold());
    println!();

    let mut sandbox = Sandbox::new()?;
    sandbox.set_harvest_slippage(config.harvest_slippage_bps);
    let (mut store, strategies) = sandbox.governance()?;
    store.set_breach_policy(GOVERNANCE, config.limit_breach_policy)?;
    for (role, account) in [
        (Role::Operator, config.operator()?),
        (Role::FinanceOperator, config.finance_operator()?),
    ] {
        if let Some(account) = account {
            store.grant_role(GOVERNANCE, role, account)?;
        }
    }
    let mut vault = Vault::new(VAULT, strategies.tokens_hash, store.catalog(), config)?;

    store.set_best_strategy(OPERATOR, config.risk_profile, strategies.compound)?;
    sandbox.fund(DAI, DEMO_USER, deposit)?;
    {
        let ctx = RouterContext::new(&store, &sandbox.adapters, &sandbox.harvester);
        let report = vault.user_deposit_rebalance(
            &mut sandbox.ledger,
            &ctx,
            DEMO_USER,
            Sandbox::units(deposit),
        )?;
        print_report("Deposit + rebalance into Compound", &report);
    }

    store.set_best_strategy(OPERATOR, config.risk_profile, strategies.curve_staked)?;
    {
        let ctx = RouterContext::new(&store, &sandbox.adapters, &sandbox.harvester);
        let report = vault.rebalance(&mut sandbox.ledger, &ctx, OPERATOR)?;
        print_report("Switch to staked Curve LP", &report);
    }

    sandbox.ledger.advance_time(SECONDS_PER_DAY);
    let shares = vault.shares_of(&DEMO_USER);
    vault.user_withdraw(DEMO_USER, shares / U256::from(2u64))?;
    {
        let ctx = RouterContext::new(&store, &sandbox.adapters, &sandbox.harvester);
        let report = vault.rebalance(&mut sandbox.ledger, &ctx, OPERATOR)?;
        print_report("Harvest after one day, settle half withdrawal", &report);
    }

    let owed = vault.settle_gas_owed(&store, OPERATOR)?;
    println!(
        "{} User holds {} DAI and {} shares; operator reimbursed {} wei",
        style("✓").green(),
        fmt_units(sandbox.ledger.token_balance(DAI, DEMO_USER)),
        fmt_units(vault.shares_of(&DEMO_USER)),
        owed
    );
    println!();

    println!("{}", style("═══ STAKING REWARD RATES ═══").blue().bold());
    println!();
    let mut allocator = RewardRateAllocator::new(U256::from(config.total_emission_rate));
    let now = sandbox.ledger.timestamp();
    for tier in 0..TIER_COUNT {
        allocator.stake(DEMO_USER, tier, Sandbox::units(100), now)?;
    }
    for (tier, rate) in allocator.rates().iter().enumerate() {
        let lock = allocator.tier(tier)?.locking_term_days;
        println!("   tier {} ({:>3} days): {} per second", tier, lock, fmt_units(*rate));
    }
    println!();

    Ok(())
}

fn run_hash(tokens: &[Address], raw_steps: &[String]) -> Result<()> {
    let set = tokens_hash(tokens);
    println!("tokens   {}", set);

    let steps = raw_steps
        .iter()
        .map(|raw| parse_step(raw))
        .collect::<Result<Vec<_>>>()?;
    for (i, step) in steps.iter().enumerate() {
        println!(
            "step {:<3} {}{}",
            i,
            step_hash(step),
            if step.is_borrow { " (borrow)" } else { "" }
        );
    }
    if !steps.is_empty() {
        println!("strategy {}", strategy_hash(set, &steps));
    }
    Ok(())
}

fn parse_target(family: ProtocolFamily, raw: &str) -> Result<PoolTarget> {
    let address = |s: &str| -> Result<Address> {
        s.parse()
            .map_err(|e| eyre!("invalid address '{}' in pool '{}': {}", s, raw, e))
    };
    match raw.split(':').collect::<Vec<_>>().as_slice() {
        [pool] => Ok(PoolTarget::new(family, address(pool)?)),
        [pool, lp_token] => {
            Ok(PoolTarget::new(family, address(pool)?).with_lp_token(address(lp_token)?))
        }
        _ => Err(eyre!("pool '{}' must be pool[:lp_token]", raw)),
    }
}

async fn run_inspect(config: &EngineConfig, family: ProtocolFamily, pools: &[String]) -> Result<()> {
    let targets = pools
        .iter()
        .map(|raw| parse_target(family, raw))
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Inspecting {} {} pool(s) via {}",
        targets.len(),
        family,
        config.rpc_url
    );
    let inspector = ChainInspector::new(config.rpc_url.clone());
    let snapshots = inspector.snapshot_all(targets.clone()).await;

    for (target, snapshot) in targets.iter().zip(snapshots) {
        match snapshot {
            Ok(PoolSnapshot {
                pool_value: Some(value),
                ..
            }) => println!(
                "{} {} pool {} value {}",
                style("✓").green(),
                family,
                target.pool,
                fmt_units(value)
            ),
            Ok(_) => println!("{} No code at {}", style("✗").red(), target.pool),
            Err(e) => println!("{} {}: {}", style("✗").red(), target.pool, e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("yield_router=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Hash { tokens, steps } => run_hash(&tokens, &steps),
        Command::Config => {
            let config = load_config(cli.config.as_ref())?;
            config.print_summary();
            Ok(())
        }
        Command::Demo { deposit } => {
            print_banner();
            let config = load_config(cli.config.as_ref())?;
            config.print_summary();
            println!();
            run_demo(&config, deposit)
        }
        Command::Inspect { family, pools } => {
            let config = load_config(cli.config.as_ref())?;
            run_inspect(&config, family, &pools).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step_variants() {
        let pool = Address::repeat_byte(1);
        let out = Address::repeat_byte(2);
        let invest = parse_step(&format!("{pool}:{out}")).unwrap();
        assert_eq!(invest, StrategyStep::invest(pool, out));
        let borrow = parse_step(&format!("{pool}:{out}:borrow")).unwrap();
        assert!(borrow.is_borrow);
        assert!(parse_step("nope").is_err());
        assert!(parse_step(&format!("{pool}:{out}:stake")).is_err());
    }

    #[test]
    fn test_parse_target_with_optional_lp_token() {
        let pool = Address::repeat_byte(1);
        let lp = Address::repeat_byte(2);
        let plain = parse_target(ProtocolFamily::Compound, &format!("{pool}")).unwrap();
        assert_eq!(plain, PoolTarget::new(ProtocolFamily::Compound, pool));
        let curve = parse_target(ProtocolFamily::Curve, &format!("{pool}:{lp}")).unwrap();
        assert_eq!(curve.lp_token, Some(lp));
        assert!(parse_target(ProtocolFamily::Curve, &format!("{pool}:{lp}:{lp}")).is_err());
    }

    #[test]
    fn test_fmt_units() {
        assert_eq!(fmt_units(WAD * U256::from(3u64) / U256::from(2u64)), "1.5000");
        assert_eq!(fmt_units(U256::ZERO), "0.0000");
    }
}
