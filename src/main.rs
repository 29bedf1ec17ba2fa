use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use points_cli::{api::verify_proof, AppConfig, AppError, PointsApi};
use points_ledger::Action;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "points-cli", version, about = "Loyalty points ledger, referrals and merkle snapshots")]
struct Cli {
    /// JSON config file.
    #[arg(long, global = true, default_value = "points.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one accrual cycle over a JSONL file of balance facts.
    Ingest {
        #[arg(long)]
        facts: PathBuf,
    },
    /// Point totals and rank for one participant.
    Points {
        #[arg(long)]
        participant: String,
    },
    Leaderboard {
        #[arg(long)]
        season: Option<u32>,
        #[arg(long)]
        limit: Option<usize>,
    },
    Seasons,
    /// Linear projection for a position held unchanged.
    Project {
        #[arg(long)]
        usd: f64,
        #[arg(long, value_parser = parse_action)]
        action: Action,
        #[arg(long)]
        season: u32,
    },
    Apy {
        #[arg(long)]
        season: u32,
        #[arg(long)]
        weighted_participation: f64,
    },
    #[command(subcommand)]
    Referral(ReferralCommand),
    /// Publish the committed ledger as a snapshot (admin).
    Snapshot {
        #[arg(long)]
        id: u64,
        #[arg(long)]
        block: u64,
        #[arg(long)]
        token: String,
    },
    /// Merkle proof for a participant, read from the published snapshot.
    Proof {
        #[arg(long)]
        snapshot: u64,
        #[arg(long)]
        participant: String,
    },
    /// Manifest of one snapshot, or the latest one.
    Manifest {
        #[arg(long)]
        snapshot: Option<u64>,
    },
    /// Offline proof check; needs no config.
    Verify {
        #[arg(long)]
        leaf: String,
        #[arg(long)]
        root: String,
        #[arg(long = "proof", num_args = 0..)]
        proof: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ReferralCommand {
    CreateCode {
        #[arg(long)]
        owner: String,
    },
    Link {
        #[arg(long)]
        referee: String,
        #[arg(long)]
        code: String,
    },
    Stats {
        #[arg(long)]
        participant: String,
    },
    Tree {
        #[arg(long)]
        root: String,
        #[arg(long, default_value_t = 2)]
        depth: u32,
    },
    Validate {
        #[arg(long)]
        code: String,
    },
    Metrics,
    Chain {
        #[arg(long)]
        referee: String,
    },
}

fn parse_action(s: &str) -> Result<Action, String> {
    Action::parse(s).ok_or_else(|| {
        let known: Vec<&str> = Action::EARNING.iter().map(Action::as_str).collect();
        format!("unknown action `{s}`, expected one of {}", known.join(", "))
    })
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        let body = ErrorBody {
            error: err.code(),
            message: err.to_string(),
        };
        match serde_json::to_string(&body) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("error: {err}"),
        }
        std::process::exit(if err.is_user_error() { 2 } else { 1 });
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    if let Command::Verify { leaf, root, proof } = &cli.command {
        let valid = verify_proof(leaf, proof, root)?;
        return print(&serde_json::json!({ "valid": valid }));
    }

    let config = AppConfig::load(&cli.config)?;
    let api = PointsApi::open(config)?;

    match cli.command {
        Command::Ingest { facts } => print(&api.ingest_file(&facts)?),
        Command::Points { participant } => print(&api.participant_summary(&participant)?),
        Command::Leaderboard { season, limit } => print(&api.leaderboard(season, limit)?),
        Command::Seasons => print(&api.seasons(Utc::now())),
        Command::Project { usd, action, season } => {
            print(&api.projection(usd, action, season)?)
        }
        Command::Apy {
            season,
            weighted_participation,
        } => print(&api.implied_apy(season, weighted_participation)?),
        Command::Referral(cmd) => match cmd {
            ReferralCommand::CreateCode { owner } => print(&api.create_referral_code(&owner)?),
            ReferralCommand::Link { referee, code } => {
                print(&api.link_referral(&referee, &code)?)
            }
            ReferralCommand::Stats { participant } => print(&api.referral_stats(&participant)?),
            ReferralCommand::Tree { root, depth } => print(&api.referral_tree(&root, depth)?),
            ReferralCommand::Validate { code } => print(&api.validate_referral_code(&code)),
            ReferralCommand::Metrics => print(&api.referral_metrics()),
            ReferralCommand::Chain { referee } => print(&api.referral_chain(&referee)?),
        },
        Command::Snapshot { id, block, token } => print(&api.trigger_snapshot(&token, id, block)?),
        Command::Proof {
            snapshot,
            participant,
        } => print(&api.proof(snapshot, &participant)?),
        Command::Manifest { snapshot } => match snapshot {
            Some(id) => print(&api.manifest(id)?),
            None => print(&api.latest_manifest()?),
        },
        Command::Verify { .. } => Ok(()),
    }
}

fn print<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
