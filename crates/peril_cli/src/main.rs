use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use peril_control::{build_strategies, relay_pair, RelayHandle, RelayMessage, StrategyKind};
use peril_core::{
    replay_game, Action, Decision, EngineError, Event, EventEnvelope, GameConfig, GameSnapshot,
    PlayerSetup, Simulation, TerminalResult, VictoryCondition,
};
use serde::Deserialize;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "peril_cli", about = "Pipeline & Peril game runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one game to the end.
    Run(RunArgs),
    /// Rebuild a game from its config and event log and check it matches.
    Replay {
        /// Game config JSON used for the original game.
        #[arg(long)]
        config: String,
        /// Event log written by `run --events`.
        #[arg(long)]
        events: String,
        /// Write the rebuilt final snapshot here.
        #[arg(long)]
        export: Option<String>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Load the game config from a JSON file; flags below override it.
    #[arg(long)]
    config: Option<String>,
    /// Dice seed. Random when neither this nor a config file is given.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    rounds: Option<u32>,
    #[arg(long)]
    players: Option<usize>,
    #[arg(long, value_parser = ["cooperative", "competitive", "survival"])]
    victory: Option<String>,
    /// Strategy per seat (pass, rule, aggressive, adaptive); one value fills every seat.
    #[arg(long = "strategy", default_value = "rule")]
    strategies: Vec<String>,
    /// Seat driven from stdin, one JSON action per line.
    #[arg(long)]
    human: Option<usize>,
    /// Decision deadline for the human seat.
    #[arg(long, default_value_t = 300_000)]
    human_deadline_ms: u64,
    /// Write the final snapshot as JSON.
    #[arg(long)]
    export: Option<String>,
    /// Write the event log as JSON lines.
    #[arg(long)]
    events: Option<String>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

struct Finished {
    result: Result<TerminalResult, EngineError>,
    snapshot: GameSnapshot,
    events: Vec<EventEnvelope>,
}

fn load_config(path: &str) -> Result<GameConfig> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading config: {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("parsing config: {path}"))
}

fn resolve_config(args: &RunArgs) -> Result<GameConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GameConfig {
            seed: rand::random(),
            ..GameConfig::default()
        },
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(rounds) = args.rounds {
        config.max_rounds = rounds;
    }
    if let Some(players) = args.players {
        config.players = PlayerSetup::defaults(players);
    }
    if let Some(victory) = &args.victory {
        config.victory = match victory.as_str() {
            "competitive" => VictoryCondition::Competitive,
            "survival" => VictoryCondition::survival(),
            _ => VictoryCondition::cooperative(),
        };
    }
    if args.human.is_some() {
        config.decision_deadline_ms = args.human_deadline_ms;
    }
    config.validate().context("invalid game config")?;
    Ok(config)
}

fn run(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let kinds = args
        .strategies
        .iter()
        .map(|name| {
            StrategyKind::from_name(name).with_context(|| {
                format!("unknown strategy '{name}'. Valid: pass, rule, aggressive, adaptive")
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let mut strategies = build_strategies(&kinds, config.players.len(), config.seed)?;

    let handle = match args.human {
        Some(seat) if seat >= strategies.len() => {
            bail!("--human {seat} is out of range for {} players", strategies.len())
        }
        Some(seat) => {
            let (relay, handle) = relay_pair();
            strategies[seat] = Box::new(relay);
            Some(handle)
        }
        None => None,
    };

    println!(
        "Starting game: seed={} players={} max_rounds={} victory={}",
        config.seed,
        config.players.len(),
        config.max_rounds,
        config.victory.label()
    );
    println!("{}", "-".repeat(80));

    let sim = Simulation::new(config, strategies)?;
    println!("Seats: {}", sim.strategy_names().join(", "));

    let finished = match handle {
        Some(handle) => {
            let engine = std::thread::spawn(move || play(sim));
            drive_human(&handle);
            drop(handle);
            match engine.join() {
                Ok(finished) => finished,
                Err(_) => bail!("engine thread panicked"),
            }
        }
        None => play(sim),
    };

    if let Some(path) = &args.events {
        write_events(Path::new(path), &finished.events)?;
        println!("Events written to {path}");
    }
    if let Some(path) = &args.export {
        write_snapshot(Path::new(path), &finished.snapshot)?;
        println!("Snapshot written to {path}");
    }

    let result = finished.result?;
    println!("{}", "-".repeat(80));
    print_result(&result);
    Ok(())
}

/// Plays to the end, printing one status line per round. The simulation is
/// dropped before returning so relayed seats see their channel close.
fn play(mut sim: Simulation) -> Finished {
    while !sim.is_finished() {
        if let Err(err) = sim.play_round() {
            return finish(&sim, Err(err));
        }
        print_round(&sim);
    }
    let result = sim.run();
    finish(&sim, result)
}

fn finish(sim: &Simulation, result: Result<TerminalResult, EngineError>) -> Finished {
    Finished {
        result,
        snapshot: sim.snapshot(),
        events: sim.events().to_vec(),
    }
}

fn print_round(sim: &Simulation) {
    let Some(row) = sim.round_metrics().last() else {
        return;
    };
    let chaos = if row.chaos_this_round.is_empty() {
        "-"
    } else {
        row.chaos_this_round.as_str()
    };
    println!(
        "[round={:02}]  entropy={:2}  uptime avg={:5.1} min={:5.1}  \
         handled={:5} dropped={:5}  services={:3}  chaos={chaos}",
        row.round,
        row.entropy,
        row.avg_uptime,
        row.min_uptime,
        row.requests_handled,
        row.requests_dropped,
        row.services_alive,
    );
}

fn print_result(result: &TerminalResult) {
    match result {
        TerminalResult::Timeout { round } => println!("Draw: time ran out after round {round}."),
        TerminalResult::CooperativeWin { round, .. } => {
            println!("Cooperative win in round {round}: the system held.");
        }
        TerminalResult::CompetitiveWin {
            round,
            winners,
            score,
        } => {
            let names: Vec<String> = winners.iter().map(ToString::to_string).collect();
            println!(
                "Competitive win in round {round}: {} (score {score:.1})",
                names.join(", ")
            );
        }
        TerminalResult::SurvivalWin { round, winner } => {
            println!("Survival win in round {round}: {winner} is the last one standing.");
        }
        TerminalResult::Collapse { round } => {
            println!("Total collapse in round {round}: every system is down.");
        }
    }
}

// ---------------------------------------------------------------------------
// Human seat
// ---------------------------------------------------------------------------

/// One line of human input: an action in wire form, optionally with the
/// physical d20 results to use for it.
#[derive(Deserialize)]
struct HumanMove {
    #[serde(flatten)]
    action: Action,
    #[serde(default)]
    dice_rolls: Option<Vec<u8>>,
}

fn parse_human_input(line: &str) -> Result<Decision> {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("pass") {
        return Ok(Decision::Pass);
    }
    let parsed: HumanMove = serde_json::from_str(line).context("expected an action JSON or 'pass'")?;
    Ok(Decision::Act {
        action: parsed.action,
        dice_rolls: parsed.dice_rolls,
    })
}

fn drive_human(handle: &RelayHandle) {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    while let Some(message) = handle.next_message() {
        match message {
            RelayMessage::Prompt(prompt) => {
                println!(
                    "\n{} round {}: {} actions left, resources cpu={} mem={} sto={}, uptime {:.1}, entropy {}",
                    prompt.player,
                    prompt.round,
                    prompt.actions_remaining,
                    prompt.resources.cpu,
                    prompt.resources.memory,
                    prompt.resources.storage,
                    prompt.uptime,
                    prompt.entropy
                );
                println!(
                    "Enter an action as JSON, e.g. {{\"action_type\":\"gather\",\"parameters\":{{\"resource\":\"cpu\"}}}}, or 'pass':"
                );
                let decision = loop {
                    let Some(Ok(line)) = lines.next() else {
                        // Stdin closed: stop answering so the seat disconnects.
                        return;
                    };
                    match parse_human_input(&line) {
                        Ok(decision) => break decision,
                        Err(err) => println!("{err:#}"),
                    }
                };
                if !handle.send(decision) {
                    return;
                }
            }
            RelayMessage::Feedback(feedback) => match feedback.result.error {
                None => println!("Applied {}.", feedback.action.label()),
                Some(reason) => println!("Rejected {}: {reason}", feedback.action.label()),
            },
            RelayMessage::RoundFinished { round, uptime } => {
                println!("Round {round} finished, your uptime is {uptime:.1}.");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

fn write_events(path: &Path, events: &[EventEnvelope]) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for envelope in events {
        serde_json::to_writer(&mut out, envelope).context("serializing event")?;
        out.write_all(b"\n")?;
    }
    out.flush().context("flushing events")?;
    Ok(())
}

fn read_events(path: &Path) -> Result<Vec<EventEnvelope>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    std::io::BufReader::new(file)
        .lines()
        .enumerate()
        .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
        .map(|(n, line)| {
            let line = line.with_context(|| format!("reading line {}", n + 1))?;
            serde_json::from_str(&line).with_context(|| format!("parsing event on line {}", n + 1))
        })
        .collect()
}

fn write_snapshot(path: &Path, snapshot: &GameSnapshot) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), snapshot)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

fn replay(config_path: &str, events_path: &str, export: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let recorded = read_events(Path::new(events_path))?;
    let expected = recorded.iter().rev().find_map(|e| match &e.event {
        Event::GameEnded { result } => Some(result.clone()),
        _ => None,
    });

    let sim = replay_game(&config, &recorded)?;
    let snapshot = sim.snapshot();
    println!(
        "Replayed {} events: round {}, entropy {}, {} services",
        recorded.len(),
        snapshot.round,
        snapshot.entropy,
        snapshot.services.len()
    );
    if let Some(path) = export {
        write_snapshot(Path::new(path), &snapshot)?;
        println!("Snapshot written to {path}");
    }

    match (&expected, &snapshot.result) {
        (Some(recorded), Some(rebuilt)) if recorded == rebuilt => {
            info!(outcome = rebuilt.label(), "replay matches");
            println!("Replay matches the recorded outcome.");
            print_result(rebuilt);
            Ok(())
        }
        (None, _) => bail!("event log has no game_ended event"),
        (Some(recorded), rebuilt) => {
            bail!("replay diverged: recorded {recorded:?}, rebuilt {rebuilt:?}")
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(&args)?,
        Commands::Replay {
            config,
            events,
            export,
        } => replay(&config, &events, export.as_deref())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use peril_core::{ResourceKind, ServiceId};

    #[test]
    fn blank_and_pass_lines_pass() {
        assert_eq!(parse_human_input("").unwrap(), Decision::Pass);
        assert_eq!(parse_human_input("  PASS ").unwrap(), Decision::Pass);
    }

    #[test]
    fn action_lines_become_decisions() {
        let decision =
            parse_human_input(r#"{"action_type":"gather","parameters":{"resource":"memory"}}"#)
                .unwrap();
        assert_eq!(
            decision,
            Decision::act(Action::Gather {
                resource: ResourceKind::Memory
            })
        );

        let decision = parse_human_input(
            r#"{"action_type":"debug","parameters":{"service":3},"dice_rolls":[17]}"#,
        )
        .unwrap();
        assert_eq!(
            decision,
            Decision::Act {
                action: Action::Debug {
                    service: ServiceId(3)
                },
                dice_rolls: Some(vec![17]),
            }
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_human_input("build a database").is_err());
    }

    #[test]
    fn flags_override_the_defaults() {
        let args = RunArgs {
            config: None,
            seed: Some(3),
            rounds: Some(5),
            players: Some(2),
            victory: Some("survival".to_string()),
            strategies: vec!["pass".to_string()],
            human: None,
            human_deadline_ms: 1,
            export: None,
            events: None,
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.players.len(), 2);
        assert_eq!(config.victory, VictoryCondition::survival());
        assert_eq!(config.decision_deadline_ms, GameConfig::default().decision_deadline_ms);
    }
}
