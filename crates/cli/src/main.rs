//! CLI for the Gatewarden licence-plate gate controller.
//!
//! `run` replays a recorded scenario through the full pipeline:
//! presence -> scan -> consensus -> allow-lists -> actuator -> report.

use clap::{Parser, Subcommand};
use gatewarden_core::{AccessDecision, Category, GateConfig, Plate, PlateNormalizer, Verdict};
use gatewarden_engine::sink::json_stream::JsonStreamSink;
use gatewarden_engine::{AccessLists, AccessRegistry, GateDevices, GateRuntime, SessionReport};
use gatewarden_provider::sim::SimulatedRig;
use gatewarden_provider::Scenario;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[derive(Parser, Debug)]
#[command(name = "gatewarden", version, about = "Licence-plate gate controller")]
struct Cli {
    /// Gate configuration file (JSON). Missing file means defaults.
    #[arg(
        short,
        long,
        env = "GATEWARDEN_CONFIG",
        default_value = "data/config.json",
        global = true
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded scenario through the gate pipeline.
    Run {
        #[arg(short, long)]
        scenario: PathBuf,

        /// Print session stats as JSON instead of the report.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Sink output: "ndjson" writes NDJSON to stdout,
        /// "ndjson:/path/to/file" writes to file.
        #[arg(long)]
        sink: Option<String>,
    },
    /// Resolve plates against the allow-lists.
    Check {
        #[arg(required = true)]
        plates: Vec<String>,
    },
    /// Print the normalized form of recognizer text.
    Normalize { text: String },
    /// Check a plate against the regional format.
    Validate { plate: String },
    /// Manage the allow-lists in the config file.
    Plates {
        #[command(subcommand)]
        action: PlateAction,
    },
}

#[derive(Subcommand, Debug)]
enum PlateAction {
    List,
    Add {
        plate: String,
        /// Add to the guest list instead of the homeowner list.
        #[arg(long, default_value_t = false)]
        guest: bool,
    },
    Remove {
        plate: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GateConfig::load(&cli.config)?;
    let normalizer = PlateNormalizer::from_config(&config);

    match cli.command {
        Commands::Run {
            scenario,
            json,
            sink,
        } => run(config, normalizer, &scenario, json, sink).await?,

        Commands::Check { plates } => {
            let lists = AccessLists::from_config(&config, &normalizer);
            for raw in &plates {
                let plate = normalizer.normalize(raw);
                if plate.is_empty() {
                    println!("{raw:?}: unreadable plate");
                    continue;
                }
                let decision = manual_decision(plate.clone(), lists.lookup(&plate));
                println!("{}", decision.message());
            }
        }

        Commands::Normalize { text } => {
            let plate = normalizer.normalize(&text);
            if plate.is_empty() {
                return Err(format!("{text:?} does not normalize to a plate").into());
            }
            println!("{plate}");
        }

        Commands::Validate { plate } => {
            let normalized = normalizer.normalize(&plate);
            if normalized.is_well_formed() {
                println!("{normalized}: valid");
            } else {
                return Err(format!("{plate:?}: not a valid plate format").into());
            }
        }

        Commands::Plates { action } => plates(config, &normalizer, &cli.config, action)?,
    }

    Ok(())
}

async fn run(
    config: GateConfig,
    normalizer: PlateNormalizer,
    scenario_path: &Path,
    json: bool,
    sink: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Arc::new(Scenario::load(scenario_path)?);
    let registry = Arc::new(AccessRegistry::new(AccessLists::from_config(
        &config,
        &normalizer,
    )));

    tracing::info!(
        scenario = %scenario_path.display(),
        duration_s = scenario.duration_s,
        homeowners = registry.snapshot().homeowner_count(),
        guests = registry.snapshot().guest_count(),
        "starting replay"
    );

    // Scheduled allow-list reloads; dropping the set cancels the rest.
    let mut reloads = JoinSet::new();
    for reload in scenario.reloads.clone() {
        let registry = Arc::clone(&registry);
        let normalizer = normalizer.clone();
        reloads.spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(reload.at_s.max(0.0))).await;
            registry.reload(AccessLists::from_raw(
                &normalizer,
                reload.homeowner.as_slice(),
                reload.guest.as_slice(),
            ));
        });
    }

    let rig = SimulatedRig::new(Arc::clone(&scenario));
    let devices = GateDevices {
        sensor: Box::new(rig.sensor),
        camera: Box::new(rig.camera),
        reader: Arc::new(rig.reader),
        actuator: Box::new(rig.servo),
    };

    let (tx, mut rx) = mpsc::channel(256);
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });

    let origin = Instant::now();
    let result = GateRuntime::new(config, registry)
        .with_event_channel(tx)
        .run(devices)
        .await;
    let events = collector.await?;
    drop(reloads);

    let report = SessionReport::build(&events, origin, origin.elapsed())
        .with_fault(result.as_ref().err().map(ToString::to_string));

    if let Some(ref sink_spec) = sink {
        let rows = report.to_rows(&events);
        if sink_spec == "ndjson" {
            let mut s = JsonStreamSink::stdout();
            s.write_rows(&rows)?;
            let n = s.finish()?;
            tracing::info!(rows = n, "ndjson sink: wrote to stdout");
        } else if let Some(path) = sink_spec.strip_prefix("ndjson:") {
            let file = std::fs::File::create(path)?;
            let mut s = JsonStreamSink::new(file);
            s.write_rows(&rows)?;
            let n = s.finish()?;
            tracing::info!(rows = n, path, "ndjson sink: wrote to file");
        } else {
            eprintln!("Unknown sink: {sink_spec}. Use 'ndjson' or 'ndjson:/path'");
        }

        // Still print report to stderr so it's visible.
        eprint!("{}", report.render());
    } else if json {
        match &result {
            Ok(stats) => println!("{}", serde_json::to_string_pretty(stats)?),
            Err(_) => println!("{}", serde_json::to_string_pretty(&report.to_summary_row())?),
        }
    } else {
        print!("{}", report.render());
    }

    result?;
    Ok(())
}

/// Decision for a plate typed by an operator rather than read by the camera.
fn manual_decision(plate: Plate, category: Option<Category>) -> AccessDecision {
    let now = std::time::Instant::now();
    let verdict = Verdict {
        plate,
        matches: 1,
        mean_confidence: 1.0,
        first_seen: now,
        last_seen: now,
    };
    AccessDecision::resolve(&verdict, category)
}

fn plates(
    mut config: GateConfig,
    normalizer: &PlateNormalizer,
    path: &Path,
    action: PlateAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PlateAction::List => {
            println!("Homeowner plates ({}):", config.homeowner_plates.len());
            for p in &config.homeowner_plates {
                println!("  {p}");
            }
            println!("Guest plates ({}):", config.guest_plates.len());
            for p in &config.guest_plates {
                println!("  {p}");
            }
        }

        PlateAction::Add { plate, guest } => {
            let normalized = normalizer.normalize(&plate);
            if normalized.is_empty() {
                return Err(format!("{plate:?} does not normalize to a plate").into());
            }
            let lists = AccessLists::from_config(&config, normalizer);
            if let Some(category) = lists.lookup(&normalized) {
                return Err(format!("{normalized} is already listed as {category}").into());
            }
            if !normalized.is_well_formed() {
                tracing::warn!(plate = %normalized, "adding plate with an unusual format");
            }

            let category = if guest {
                config.guest_plates.push(normalized.to_string());
                Category::Guest
            } else {
                config.homeowner_plates.push(normalized.to_string());
                Category::Homeowner
            };
            config.save(path)?;
            println!("Added {normalized} as {category}");
        }

        PlateAction::Remove { plate } => {
            let target = normalizer.normalize(&plate);
            let before = config.homeowner_plates.len() + config.guest_plates.len();
            config
                .homeowner_plates
                .retain(|p| normalizer.normalize(p) != target);
            config.guest_plates.retain(|p| normalizer.normalize(p) != target);
            let removed = before - config.homeowner_plates.len() - config.guest_plates.len();

            if target.is_empty() || removed == 0 {
                return Err(format!("{plate:?} is not on any list").into());
            }
            config.save(path)?;
            println!("Removed {target}");
        }
    }
    Ok(())
}
