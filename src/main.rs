//! BidSwarm - Budgeted agent swarms for marketplace bidding
//!
//! Main entry point for the bidswarm CLI.

mod commands;

use anyhow::{bail, Context as _};
use bidswarm::clock::{add_duration, Clock, ManualClock, SharedClock};
use bidswarm::config::{validate_config, validate_swarm_options, BidSwarmConfig};
use bidswarm::events::{
    EventFilter, EventLog, EventType, ObservationFilter, SwarmEvent, SwarmInsights,
};
use bidswarm::ids::{AgentId, ListingId, SwarmId};
use bidswarm::marketplace::{Listing, RetryingMarketplace, SharedMarketplace, SimulatedMarketplace};
use bidswarm::storage::{export_events, export_trail, SharedStore, SqliteStore, SwarmStore};
use bidswarm::swarm::{spawn_store_subscriber, SwarmController, SwarmOptions, SwarmStatusReport};
use chrono::Utc;
use clap::Parser;
use commands::{Cli, Commands};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let cli = Cli::parse();

    let loaded = if matches!(cli.command, Commands::Init { .. }) {
        Ok(BidSwarmConfig::default())
    } else {
        load_config(&cli.config)
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    // Initialize logging
    if let Err(e) = bidswarm::logging::init_from(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: &Option<PathBuf>) -> anyhow::Result<BidSwarmConfig> {
    match path {
        Some(path) => BidSwarmConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => BidSwarmConfig::load_or_default().context("Failed to load default config"),
    }
}

fn run(cli: Cli, config: BidSwarmConfig) -> anyhow::Result<()> {
    let db_path = cli.db.clone().unwrap_or_else(|| config.storage.path.clone());

    match cli.command {
        Commands::Init { force } => handle_init_command(&cli.config, force),
        Commands::Validate { swarm } => handle_validate_command(&config, swarm.as_deref()),
        Commands::Run {
            swarm,
            listings,
            duration,
            persist,
            export,
        } => {
            let store = if persist || cli.db.is_some() {
                Some(open_store(&config, &db_path)?)
            } else {
                None
            };
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(handle_run_command(
                &config,
                RunArgs {
                    swarm_path: swarm,
                    listings_path: listings,
                    duration_minutes: duration,
                    store,
                    export,
                    json: cli.json,
                },
            ))
        }
        Commands::Swarms => {
            let store = open_store(&config, &db_path)?;
            let swarms = store.list_swarms()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&swarms)?);
                return Ok(());
            }
            if swarms.is_empty() {
                println!("No swarms stored in {}", db_path.display());
                return Ok(());
            }
            for swarm in swarms {
                println!(
                    "{}  {:<10} {:<24} spent {} of {}",
                    swarm.id,
                    swarm.status.as_str(),
                    swarm.name,
                    swarm.counters.total_spent,
                    swarm.budget.total
                );
            }
            Ok(())
        }
        Commands::Events {
            swarm_id,
            agent,
            listing,
            event_types,
            limit,
            export,
        } => {
            let store = open_store(&config, &db_path)?;
            let mut filter = EventFilter::for_swarm(&SwarmId::new(swarm_id));
            if let Some(agent) = agent {
                filter = filter.with_agent(&AgentId::new(agent));
            }
            if let Some(listing) = listing {
                filter = filter.with_listing(&ListingId::new(listing));
            }
            for name in &event_types {
                let Some(event_type) = EventType::parse(name) else {
                    bail!("Unknown event type '{}'", name);
                };
                filter = filter.with_type(event_type);
            }
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }

            let events = store.query_events(&filter)?;
            if let Some(path) = export {
                let written = export_events(&path, &events)?;
                println!("✓ Exported {} events to {}", written, path.display());
            } else if cli.json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for event in &events {
                    print_event(event);
                }
                println!("{} events", events.len());
            }
            Ok(())
        }
        Commands::Insights { swarm_id } => {
            let store = open_store(&config, &db_path)?;
            let id = SwarmId::new(swarm_id);
            let swarm = store
                .load_swarm(&id)?
                .with_context(|| format!("Swarm {} not found in {}", id, db_path.display()))?;
            let events = store.query_events(&EventFilter::for_swarm(&id))?;
            let observations = store.query_observations(&ObservationFilter::for_swarm(&id))?;
            let insights =
                SwarmInsights::compute(&swarm, &events, &observations, &config.controller.analytics);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&insights)?);
            } else {
                print_insights(&insights);
            }
            Ok(())
        }
        Commands::Metrics => {
            print!("{}", bidswarm::metrics::encode_metrics()?);
            Ok(())
        }
    }
}

fn open_store(config: &BidSwarmConfig, path: &Path) -> anyhow::Result<SharedStore> {
    let mut store_config = config.storage.store_config();
    store_config.path = path.to_path_buf();
    let store = SqliteStore::open(&store_config)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn handle_init_command(config_path: &Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let config_file = config_path
        .clone()
        .unwrap_or_else(BidSwarmConfig::default_path);

    // Check if already initialized
    if config_file.exists() && !force {
        println!("Configuration already exists at {}", config_file.display());
        println!();
        println!("To overwrite it, run:");
        println!("  bidswarm init --force");
        return Ok(());
    }

    let config = BidSwarmConfig::default();
    config.save(&config_file)?;

    println!("✓ Created configuration at {}", config_file.display());
    println!("  Database: {}", config.storage.path.display());
    println!();
    println!("Next steps:");
    println!("  bidswarm validate --swarm <swarm.yaml>");
    println!("  bidswarm run --swarm <swarm.yaml> --listings <listings.json>");
    Ok(())
}

fn handle_validate_command(config: &BidSwarmConfig, swarm: Option<&Path>) -> anyhow::Result<()> {
    let mut problems: Vec<String> = validate_config(config)
        .err()
        .unwrap_or_default()
        .iter()
        .map(|e| format!("config: {}", e))
        .collect();

    if let Some(path) = swarm {
        let options = read_swarm_options(path)?;
        problems.extend(
            validate_swarm_options(&options, Utc::now(), config.controller.max_agents_per_swarm)
                .iter()
                .map(|e| format!("swarm: {}", e)),
        );
    }

    if problems.is_empty() {
        println!("✓ Configuration is valid");
        return Ok(());
    }
    for problem in &problems {
        println!("✗ {}", problem);
    }
    bail!("{} validation problem(s)", problems.len())
}

fn read_swarm_options(path: &Path) -> anyhow::Result<SwarmOptions> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read swarm definition {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid swarm definition {}", path.display()))
}

fn read_listings(path: &Path) -> anyhow::Result<Vec<Listing>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read listings {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid listings {}", path.display()))
}

struct RunArgs {
    swarm_path: PathBuf,
    listings_path: PathBuf,
    duration_minutes: Option<u64>,
    store: Option<SharedStore>,
    export: Option<PathBuf>,
    json: bool,
}

/// Drive one swarm against the simulated marketplace in virtual time
///
/// The clock jumps straight to each scheduled cycle, so an hour-long window
/// finishes in however long the cycles take to compute.
async fn handle_run_command(config: &BidSwarmConfig, args: RunArgs) -> anyhow::Result<()> {
    let options = read_swarm_options(&args.swarm_path)?;
    let listings = read_listings(&args.listings_path)?;
    let listing_count = listings.len();

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let shared_clock: SharedClock = clock.clone();
    let market = Arc::new(SimulatedMarketplace::with_listings(shared_clock.clone(), listings));

    let client: SharedMarketplace = if config.retry.max_retries > 0 {
        Arc::new(RetryingMarketplace::new(
            market.clone(),
            config.retry.clone(),
            shared_clock.clone(),
        ))
    } else {
        market.clone()
    };

    let mut builder = SwarmController::builder(
        config.controller.clone().without_driver(),
        client,
        shared_clock.clone(),
    )
    .with_rate_limits(config.rate_limits.clone());
    if let Some(store) = &args.store {
        let log = EventLog::with_store(shared_clock.clone(), store.clone())
            .context("Failed to attach event log to the database")?;
        builder = builder.with_event_log(Arc::new(log));
    }
    let controller = builder.build();
    let subscriber = args
        .store
        .as_ref()
        .map(|store| spawn_store_subscriber(controller.subscribe(), store.clone()));

    let id = controller.create_swarm(options)?;
    controller.start_swarm(&id)?;
    tracing::info!(swarm_id = %id, listings = listing_count, "Dry run started");

    let deadline = args
        .duration_minutes
        .map(|minutes| add_duration(clock.now(), Duration::from_secs(minutes * 60)));
    let mut cycles = 0;
    loop {
        cycles += controller.run_due(&id).await?;
        let status = controller.get_status(&id)?;
        if status.swarm.status.is_terminal() {
            break;
        }
        let Some(next) = status.next_cycle_at else {
            break;
        };
        if deadline.is_some_and(|deadline| next > deadline) {
            break;
        }
        if next > clock.now() {
            clock.set(next);
        }
    }

    let report = controller.get_status(&id)?;
    if !report.swarm.status.is_terminal() {
        controller.terminate_swarm(&id, "dry run finished")?;
    }
    let report = controller.get_status(&id)?;
    let insights = controller.insights(&id)?;
    let events = controller.query_events(&EventFilter::for_swarm(&id));

    controller.shutdown().await;
    if let Some(subscriber) = subscriber {
        if let Err(e) = subscriber.await {
            tracing::warn!(error = %e, "Store subscriber panicked");
        }
    }

    if let Some(path) = &args.export {
        let observations = controller.query_observations(&ObservationFilter::for_swarm(&id));
        let written = export_trail(path, &events, &observations)?;
        eprintln!("✓ Exported {} records to {}", written, path.display());
    }

    if args.json {
        let output = serde_json::json!({
            "cycles": cycles,
            "orders": market.orders(),
            "status": report,
            "insights": insights,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_run_summary(&report, cycles, market.orders().len());
        println!();
        print_insights(&insights);
    }
    Ok(())
}

fn print_run_summary(report: &SwarmStatusReport, cycles: usize, orders: usize) {
    let swarm = &report.swarm;
    println!("Swarm {} ({})", swarm.name, swarm.id);
    println!("  Status:     {}", swarm.status);
    if let Some(reason) = &swarm.termination_reason {
        println!("  Reason:     {}", reason);
    }
    println!("  Cycles:     {}", cycles);
    println!(
        "  Budget:     {} total, {} allocatable, {} spent, {} available",
        report.budget.total, report.budget.allocatable, report.budget.spent, report.budget.available
    );
    println!(
        "  Activity:   {} bids, {} offers, {} auctions won, {} offers accepted",
        swarm.counters.bids_placed,
        swarm.counters.offers_made,
        swarm.counters.auctions_won,
        swarm.counters.offers_accepted
    );
    println!("  Orders:     {}", orders);
}

fn print_insights(insights: &SwarmInsights) {
    println!("Strategies:");
    if insights.strategy_rankings.is_empty() {
        println!("  (no bids or offers)");
    }
    for (rank, performance) in insights.strategy_rankings.iter().enumerate() {
        println!(
            "  {}. {:<16} {} won / {} settled ({:.0}%), spent {}",
            rank + 1,
            performance.strategy.as_str(),
            performance.wins,
            performance.settled(),
            performance.win_rate * 100.0,
            performance.total_spent
        );
    }

    let efficiency = &insights.cost_efficiency;
    println!(
        "Efficiency: {} items for {} ({:.1}% of budget)",
        efficiency.items_acquired,
        efficiency.total_spent,
        efficiency.budget_utilization * 100.0
    );
    println!("Concentration: {:?}", insights.concentration.level);

    if !insights.anomalies.is_empty() {
        println!("Anomalies:");
        for anomaly in &insights.anomalies {
            println!("  - {}", anomaly.description);
        }
    }
}

fn print_event(event: &SwarmEvent) {
    let agent = event.agent_id.as_ref().map(|id| id.as_str()).unwrap_or("-");
    let listing = event
        .listing_id
        .as_ref()
        .map(|id| id.as_str())
        .unwrap_or("-");
    println!(
        "{}  {:<22} agent={} listing={} {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.event_type.as_str(),
        agent,
        listing,
        event.payload
    );
}
