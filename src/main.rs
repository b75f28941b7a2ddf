use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser as _;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use tourbook::config::{load_policy, Config};
use tourbook::engine::{self, Admission};
use tourbook::model::{Booking, BookingDraft, BookingRecord, DateSpan, ResolutionPolicy};
use tourbook::season::SeasonBook;

/// Exit code when conflicts remain.
const EXIT_CONFLICTS: u8 = 2;

#[derive(Debug, clap::Parser)]
#[command(name = "tourbook", version, about = "Detect and resolve double-booked tour dates")]
struct Cli {
    /// Season ledger to use instead of TOURBOOK_SEASON.
    #[arg(long, global = true)]
    season: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct PolicyArgs {
    /// TOML file with preferred_track_order, max_shift_days and immovable_ids.
    #[arg(long)]
    policy: Option<PathBuf>,
    /// Alternate track to try, in order. Replaces the file's list.
    #[arg(long = "track")]
    tracks: Vec<String>,
    /// Largest date shift in days.
    #[arg(long)]
    max_shift: Option<u32>,
    /// Booking id that must not move. Adds to the file's list.
    #[arg(long = "pin")]
    pins: Vec<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Report conflicts and location clashes in a JSON batch.
    Check { bookings: PathBuf },
    /// Propose fixes for the conflicts in a JSON batch.
    Resolve {
        bookings: PathBuf,
        #[command(flatten)]
        policy: PolicyArgs,
        /// Write the batch with every proposal applied.
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Add a JSON batch to the season ledger.
    Import {
        bookings: PathBuf,
        /// Refuse the batch if it double-books a track.
        #[arg(long)]
        strict: bool,
    },
    /// Add one booking to the season ledger.
    Add {
        #[arg(long)]
        track: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        weight: Option<u32>,
        #[arg(long)]
        strict: bool,
    },
    /// Remove a booking from the season ledger.
    Cancel { id: String },
    /// Print every booking of the season ledger.
    List,
    /// Print the conflicts of the season ledger.
    Conflicts,
    /// Resolve the season ledger's conflicts and apply the proposals.
    Fix {
        #[command(flatten)]
        policy: PolicyArgs,
        /// Print the proposals without applying them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Day-by-day view of the season ledger.
    Calendar {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Show the free days of one track instead.
        #[arg(long)]
        track: Option<String>,
    },
    /// Rewrite the season journal to its minimal form.
    Compact,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let metrics = tourbook::observability::init(config.metrics);

    let code = match run(cli, &config) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    };

    if let Some(handle) = metrics {
        eprintln!("{}", handle.render());
    }
    code
}

fn run(cli: Cli, config: &Config) -> Result<ExitCode, Box<dyn Error>> {
    let season = cli.season.unwrap_or_else(|| config.season.clone());

    match cli.command {
        Command::Check { bookings } => {
            let bookings = read_batch(&bookings)?;
            let conflicts = engine::find_conflicts(&bookings)?;
            let clashes = engine::find_location_clashes(&bookings)?;
            print_json(&json!({ "conflicts": conflicts, "locationClashes": clashes }))?;
            Ok(exit_for(conflicts.is_empty()))
        }
        Command::Resolve {
            bookings,
            policy,
            write,
        } => {
            let bookings = read_batch(&bookings)?;
            let policy = build_policy(&policy)?;
            let (conflicts, outcome) = engine::resolve(&bookings, &policy)?;
            if let Some(path) = write {
                let patched = engine::apply_proposals(&bookings, &outcome.proposals);
                fs::write(&path, serde_json::to_string_pretty(&patched)?)?;
                info!(path = %path.display(), "patched batch written");
            }
            let clean = outcome.is_clean();
            print_json(&json!({ "conflicts": conflicts, "outcome": outcome }))?;
            Ok(exit_for(clean))
        }
        command => run_ledger(command, &season, config),
    }
}

/// Commands that operate on the season ledger.
fn run_ledger(command: Command, season: &str, config: &Config) -> Result<ExitCode, Box<dyn Error>> {
    let mut book = SeasonBook::new(config.data_dir.clone(), config.compact_threshold);
    let ledger = book.get_or_open(season)?;

    match command {
        Command::Import { bookings, strict } => {
            let bookings = read_batch(&bookings)?;
            let imported = ledger.import(bookings, admission(strict))?;
            info!(season, imported, "batch imported");
            print_json(&json!({ "imported": imported }))?;
        }
        Command::Add {
            track,
            start,
            end,
            location,
            weight,
            strict,
        } => {
            let draft = BookingDraft {
                track_id: track,
                span: DateSpan { start, end },
                location_id: location,
                weight,
            };
            let booking = ledger.create(draft, admission(strict))?;
            print_json(&booking)?;
        }
        Command::Cancel { id } => {
            let booking = ledger.cancel(&id)?;
            print_json(&booking)?;
        }
        Command::List => print_json(&ledger.bookings())?,
        Command::Conflicts => {
            let conflicts = ledger.conflicts()?;
            print_json(&conflicts)?;
            return Ok(exit_for(conflicts.is_empty()));
        }
        Command::Fix { policy, dry_run } => {
            let policy = build_policy(&policy)?;
            let (conflicts, outcome) = ledger.resolve(&policy)?;
            if !dry_run {
                let changes = ledger.apply(&outcome.proposals)?;
                info!(season, changes, "proposals applied");
            }
            let clean = outcome.is_clean();
            print_json(&json!({ "conflicts": conflicts, "outcome": outcome, "applied": !dry_run }))?;
            return Ok(exit_for(clean));
        }
        Command::Calendar { from, to, track } => {
            let window = DateSpan { start: from, end: to };
            match track {
                Some(track) => {
                    let free = ledger.free_spans(&track, window)?;
                    print_json(&json!({ "track": track, "free": free }))?;
                }
                None => {
                    let days = ledger.day_buckets(window)?;
                    let fully_booked = ledger.fully_booked_spans(window)?;
                    print_json(&json!({ "days": days, "fullyBooked": fully_booked }))?;
                }
            }
        }
        Command::Compact => {
            ledger.compact()?;
            print_json(&json!({ "bookings": ledger.len() }))?;
        }
        Command::Check { .. } | Command::Resolve { .. } => {
            return Err("check and resolve work on a batch file, not the ledger".into());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn admission(strict: bool) -> Admission {
    if strict {
        Admission::Strict
    } else {
        Admission::Lenient
    }
}

fn exit_for(clean: bool) -> ExitCode {
    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_CONFLICTS)
    }
}

/// Read a JSON array of loose booking records and validate it.
fn read_batch(path: &Path) -> Result<Vec<Booking>, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    let records: Vec<BookingRecord> = serde_json::from_str(&text)?;
    Ok(engine::parse_records(records)?)
}

fn build_policy(args: &PolicyArgs) -> Result<ResolutionPolicy, Box<dyn Error>> {
    let mut policy = match &args.policy {
        Some(path) => load_policy(path)?,
        None => ResolutionPolicy::default(),
    };
    if !args.tracks.is_empty() {
        policy.preferred_track_order = args.tracks.clone();
    }
    if let Some(days) = args.max_shift {
        policy.max_shift_days = days;
    }
    policy.immovable_ids.extend(args.pins.iter().cloned());
    engine::validate_policy(&policy)?;
    Ok(policy)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
