//! chaindao CLI — resolve contracts, watch their events and manage the
//! persisted watch cursor.
//!
//! Usage:
//! ```bash
//! chaindao resolve --artifact build/contracts/Token.json --config chaindao.json
//! chaindao watch   --artifact build/contracts/Token.json --event Transfer --store watch.json
//! chaindao cursor show  --store watch.json
//! chaindao cursor reset --store watch.json
//! chaindao check-address 0x0000000000000000000000000000000000000000
//! ```

mod logging;

use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use chaindao_core::{
    address, proxy::PROXY_FUNCTIONS, AssetProxyDao, ContractBinding, ContractDao,
    ContractDescriptor, DaoConfig, ProxyContract, TransportHandle, WatchCursor, WatchEvent,
    WatchManager,
};
use chaindao_rpc::HttpTransport;
use chaindao_storage::open_store;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "resolve" => cmd_resolve(&args[2..]).await,
        "watch" => cmd_watch(&args[2..]).await,
        "cursor" => cmd_cursor(&args[2..]).await,
        "check-address" => cmd_check_address(&args[2..]),
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("chaindao {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chaindao {}", env!("CARGO_PKG_VERSION"));
    println!("Typed contract access and resumable event watching\n");
    println!("USAGE:");
    println!("    chaindao <COMMAND>\n");
    println!("COMMANDS:");
    println!("    resolve        Bind a contract and print its address (and proxy details)");
    println!("    watch          Stream an event as JSON lines until Ctrl-C");
    println!("    cursor         Show or reset the persisted watch cursor");
    println!("    check-address  Validate an address");
    println!("    info           Show defaults");
    println!("    version        Print version");
    println!("    help           Print this help\n");
    println!("FLAGS:");
    println!("    --artifact <FILE>  Contract artifact (abi + networks)     [resolve, watch]");
    println!("    --config <FILE>    JSON config (rpc, resolver, watch, log)");
    println!("    --rpc <URL>        Endpoint URL, overrides the config");
    println!("    --at <ADDRESS>     Bind this address instead of the latest deployment");
    println!("    --event <NAME>     Event to watch                          [watch]");
    println!("    --store <FILE>     Cursor store (.json, or .db with feature sqlite)");
    println!("    --key <KEY>        Cursor key, overrides the config");
}

fn cmd_info() {
    let cfg = DaoConfig::default();
    println!("ChainDAO v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default endpoint: {}", cfg.rpc.endpoint());
    println!(
        "  Deployment confirmation: poll every {}ms, give up after {}ms",
        cfg.resolver.confirmation_poll_interval_ms, cfg.resolver.confirmation_timeout_ms
    );
    println!("  Watch poll interval: {}ms", cfg.watch.poll_interval_ms);
    println!("  Max blocks per log query: {}", cfg.watch.max_block_range);
    println!("  Cursor key: {}", cfg.watch.cursor_key);
    println!("  Storage backends: memory, JSON file, SQLite (feature: sqlite)");
}

fn cmd_check_address(args: &[String]) -> anyhow::Result<()> {
    let Some(candidate) = args.first() else {
        bail!("usage: chaindao check-address <ADDRESS>");
    };
    if !address::is_valid_address(candidate) {
        println!("{candidate}: invalid");
        process::exit(2);
    }
    if address::is_empty_address(candidate) {
        println!("{candidate}: valid (empty address)");
    } else {
        println!("{candidate}: valid");
    }
    Ok(())
}

async fn cmd_cursor(args: &[String]) -> anyhow::Result<()> {
    let action = args.first().map(String::as_str).unwrap_or_default();
    let config = load_config(args)?;
    let store_path = parse_flag(args, "--store").context("--store is required")?;
    let key = parse_flag(args, "--key").unwrap_or(config.watch.cursor_key);
    let cursor = WatchCursor::new(open_store(&store_path).await?, key);

    match action {
        "show" => match cursor.load().await? {
            Some(block) => {
                println!("{}: {block} (next watch starts at {})", cursor.key(), block + 1)
            }
            None => println!("{}: unset (next watch starts at the chain head)", cursor.key()),
        },
        "reset" => {
            cursor.reset().await?;
            println!("{}: cleared", cursor.key());
        }
        other => bail!("unknown cursor action {other:?} (expected show or reset)"),
    }
    Ok(())
}

async fn cmd_resolve(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    logging::init_tracing(&config.log)?;
    let descriptor = load_artifact(args)?;
    let dao = connect(args, &config, descriptor.clone())?;

    let address = dao.get_address().await?;
    println!("{}: {address}", descriptor.name());

    if descriptor.implements(PROXY_FUNCTIONS) {
        let proxy = AssetProxyDao::new(dao);
        if !proxy.check_validity().await? {
            println!("  not a valid asset proxy");
            return Ok(());
        }
        println!("  name:           {}", proxy.get_name().await?);
        println!("  symbol:         {}", proxy.get_symbol().await?);
        println!("  total supply:   {}", proxy.get_total_supply().await?);
        println!("  latest version: {}", proxy.get_latest_version().await?);
    }
    Ok(())
}

async fn cmd_watch(args: &[String]) -> anyhow::Result<()> {
    let mut config = load_config(args)?;
    logging::init_tracing(&config.log)?;
    let descriptor = load_artifact(args)?;
    let event = parse_flag(args, "--event").context("--event is required")?;
    let store_path = parse_flag(args, "--store").context("--store is required")?;
    if let Some(key) = parse_flag(args, "--key") {
        config.watch.cursor_key = key;
    }

    let dao = connect(args, &config, descriptor)?;
    let manager = WatchManager::new(open_store(&store_path).await?, config.watch.clone());

    let sub = manager
        .watch(&dao, &event, |e: &WatchEvent| {
            let line = serde_json::json!({
                "event": e.payload.event,
                "address": e.address,
                "blockNumber": e.block_number,
                "logIndex": e.log_index,
                "transactionHash": e.tx_hash,
                "timestamp": e.timestamp_ms,
                "args": e.payload.to_json()["fields"],
            });
            println!("{line}");
        })
        .await?;
    eprintln!("watching {} from block {} (Ctrl-C to stop)", sub.event(), sub.from_block());

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    let stopped = manager.stop_all().await;
    eprintln!("stopped {stopped} watch(es)");
    Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn load_config(args: &[String]) -> anyhow::Result<DaoConfig> {
    let mut config = match parse_flag(args, "--config") {
        Some(path) => DaoConfig::from_file(&path)?,
        None => DaoConfig::default(),
    };
    if let Some(url) = parse_flag(args, "--rpc") {
        config.rpc.url = Some(url);
    }
    Ok(config)
}

fn load_artifact(args: &[String]) -> anyhow::Result<Arc<ContractDescriptor>> {
    let path = parse_flag(args, "--artifact").context("--artifact is required")?;
    let json =
        std::fs::read_to_string(Path::new(&path)).with_context(|| format!("reading {path}"))?;
    Ok(Arc::new(ContractDescriptor::from_artifact_json(&json)?))
}

fn connect(
    args: &[String],
    config: &DaoConfig,
    descriptor: Arc<ContractDescriptor>,
) -> anyhow::Result<ContractDao> {
    let transport = TransportHandle::new(HttpTransport::new(&config.rpc)?);
    let at = parse_flag(args, "--at");
    if let Some(at) = &at {
        if !address::is_valid_address(at) {
            bail!("--at {at:?} is not a valid address");
        }
    }
    Ok(ContractDao::new(descriptor, at.as_deref(), transport, &config.resolver))
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
