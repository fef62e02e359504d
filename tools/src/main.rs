//! network-runner: headless driver for the commission engine.
//!
//! Usage:
//!   network-runner --seed 12345 --promoters 200 --customers 500 --db run.db
//!   network-runner --ipc-mode --db run.db
//!
//! In IPC mode each stdin line is one JSON `NetworkCommand`; each reply is one
//! JSON line on stdout.

use anyhow::Result;
use commission_core::{
    command::NetworkCommand,
    config::NetworkConfig,
    engine::{NetworkEngine, NewPromoter},
    error::CommissionError,
    pool::Recipient,
    rng::{generate_network, onboarding_plan},
    store::NetworkStore,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let promoters = parse_arg(&args, "--promoters", 50usize);
    let customers = parse_arg(&args, "--customers", 200usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let no_procedure = args.iter().any(|a| a == "--no-procedure");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    let config = if Path::new(data_dir).join("commission").exists() {
        NetworkConfig::load(data_dir)?
    } else {
        log::warn!("No config under '{data_dir}'; using the standard schedule");
        NetworkConfig::default()
    };

    if !ipc_mode {
        println!("Promoter network runner");
        println!("  seed:       {seed}");
        println!("  promoters:  {promoters}");
        println!("  customers:  {customers}");
        println!("  db:         {db}");
        println!("  data_dir:   {data_dir}");
        println!("  pool:       {}", config.schedule.pool_total());
        println!();
    }

    let store = if db == ":memory:" {
        NetworkStore::in_memory()?
    } else {
        NetworkStore::open_with_timeout(db, Duration::from_millis(config.store.busy_timeout_ms))?
    };
    let engine = NetworkEngine::build(store, config)?;
    if no_procedure {
        engine.store.uninstall_procedure(commission_core::store::DISTRIBUTE_PROCEDURE)?;
    }

    if ipc_mode {
        run_ipc_loop(&engine)
    } else {
        run_demo(&engine, seed, promoters, customers)
    }
}

fn run_ipc_loop(engine: &NetworkEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: NetworkCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        let quit = cmd == NetworkCommand::Quit;
        match engine.apply(cmd) {
            Ok(reply) => writeln!(stdout, "{}", serde_json::to_string(&reply)?)?,
            Err(e) => writeln!(stdout, "{}", error_json(&e))?,
        }
        stdout.flush()?;
        if quit {
            break;
        }
    }
    Ok(())
}

fn error_json(e: &CommissionError) -> serde_json::Value {
    let kind = match e {
        CommissionError::Validation(_) => "validation",
        CommissionError::PromoterNotFound { .. } => "promoter_not_found",
        CommissionError::QuotaExhausted { .. } => "quota_exhausted",
        CommissionError::ProcedureNotFound { .. } => "procedure_not_found",
        CommissionError::TransientStore(_) => "transient",
        CommissionError::PartialDistribution { .. } => "partial_distribution",
        _ => "store",
    };
    serde_json::json!({ "error": e.to_string(), "kind": kind })
}

fn run_demo(engine: &NetworkEngine, seed: u64, promoters: usize, customers: usize) -> Result<()> {
    let network = generate_network(seed, promoters);
    for p in &network {
        engine.register_promoter(&NewPromoter {
            promoter_id: p.promoter_id.clone(),
            parent_promoter_id: p.parent_promoter_id.clone(),
            name: format!("Promoter {}", p.promoter_id),
            initial_pins: p.pins,
        })?;
    }

    let mut onboarded = 0usize;
    let mut rejected = 0usize;
    let mut failed = 0usize;
    for (i, promoter_id) in onboarding_plan(seed, &network, customers).iter().enumerate() {
        match engine.onboard(promoter_id, &format!("Customer {i}")) {
            Ok(outcome) => {
                onboarded += 1;
                if outcome.distribution.is_err() {
                    failed += 1;
                }
            }
            Err(CommissionError::QuotaExhausted { .. }) => rejected += 1,
            Err(e) => return Err(e.into()),
        }
    }

    let admin = engine.commission_summary(&Recipient::Admin)?;
    let ledger_total = engine.store.commission_count()?;
    let report = engine.reconciliation_report(false)?;

    println!("=== RUN SUMMARY ===");
    println!("  promoters:        {}", network.len());
    println!("  onboarded:        {onboarded}");
    println!("  quota rejected:   {rejected}");
    println!("  dist. failures:   {failed}");
    println!("  ledger entries:   {ledger_total}");
    println!("  admin balance:    {}", admin.balance);
    println!();
    println!("=== RECONCILIATION ===");
    println!("  customers checked:       {}", report.customers_checked);
    println!("  distribution issues:     {}", report.distribution_issues.len());
    println!("  undistributed customers: {}", report.undistributed_customers.len());
    println!("  pin audit gaps:          {}", report.pin_gaps.len());
    println!("  wallet drift:            {}", report.wallet_drift.len());
    println!("  clean:                   {}", report.is_clean());
    if !report.is_clean() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
