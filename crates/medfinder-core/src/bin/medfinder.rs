//! MedFinder command line tool
//!
//! Usage:
//!   medfinder import <csv> [--organization <id>]
//!   medfinder export [--query <qs>] [--output <file> | --to-directory]
//!   medfinder stats state|county|zipcode --query <qs>
//!   medfinder historic [--series average|overall] --query <qs>
//!   medfinder search --query <qs>
//!   medfinder names <text>
//!   medfinder epidemic --active <true|false> --user <email>
//!   medfinder housekeeping
//!   medfinder rebuild-latest

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use medfinder_core::{telemetry, Config, Medfinder, QueryParams, User};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medfinder")]
#[command(about = "Track medication supply across providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "MEDFINDER_CONFIG")]
    config: Option<PathBuf>,

    /// Act as this user (restricts geography for state users)
    #[arg(short, long, global = true)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a provider supply CSV
    Import {
        /// CSV file
        file: PathBuf,

        /// Organization the providers belong to
        #[arg(short, long)]
        organization: Option<i64>,
    },

    /// Export latest supply reports as CSV
    Export {
        /// Filters as a query string, e.g. "state=3&drug_type=b,g"
        #[arg(short, long, default_value = "")]
        query: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write into the configured export directory and record the file
        #[arg(long, conflicts_with = "output")]
        to_directory: bool,
    },

    /// Supply statistics as GeoJSON
    Stats {
        level: StatsLevel,

        /// Filters as a query string, e.g. "med_id=1&formulations=2,3"
        #[arg(short, long)]
        query: String,

        /// State id (county level)
        #[arg(long)]
        state_id: Option<i64>,

        /// Zipcode (zipcode level)
        #[arg(long)]
        zipcode: Option<String>,
    },

    /// Daily supply history
    Historic {
        #[arg(long, default_value = "average")]
        series: HistoricSeries,

        /// e.g. "med_id=1&start_date=2020-03-01&end_date=2020-03-07"
        #[arg(short, long)]
        query: String,
    },

    /// Find providers near a point
    Search {
        /// e.g. "med_ids=1&formulations=2&localization=-93.29,37.21&distance=5"
        #[arg(short, long)]
        query: String,
    },

    /// Suggest medication names
    Names {
        query: String,

        #[arg(short = 'k', long, default_value = "10")]
        limit: usize,
    },

    /// Turn the epidemic flag on or off
    Epidemic {
        #[arg(long, action = ArgAction::Set)]
        active: bool,
    },

    /// Run periodic maintenance
    Housekeeping,

    /// Recompute latest flags of every supply report
    RebuildLatest,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatsLevel {
    State,
    County,
    Zipcode,
}

#[derive(Clone, Copy, ValueEnum)]
enum HistoricSeries {
    Average,
    Overall,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    telemetry::init_tracing_with_level(&config.logging.level);

    let medfinder = Medfinder::open(config)?;
    let user: Option<User> = match &cli.user {
        Some(email) => Some(
            medfinder
                .get_user_by_email(email)?
                .with_context(|| format!("unknown user {}", email))?,
        ),
        None => None,
    };
    let user = user.as_ref();

    match cli.command {
        Commands::Import { file, organization } => {
            let summary = medfinder.import_file(&file, organization)?;
            print_json(&summary)?;
        }
        Commands::Export {
            query,
            output,
            to_directory,
        } => {
            let params = QueryParams::parse(&query);
            if to_directory {
                let file = medfinder.export_to_directory(&params, user, chrono::Utc::now())?;
                print_json(&file)?;
            } else if let Some(path) = output {
                let out = std::fs::File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                let rows = medfinder.export_csv(&params, user, out)?;
                eprintln!("Wrote {} rows to {}", rows, path.display());
            } else {
                medfinder.export_csv(&params, user, std::io::stdout().lock())?;
            }
        }
        Commands::Stats {
            level,
            query,
            state_id,
            zipcode,
        } => {
            let params = QueryParams::parse(&query);
            let value = match level {
                StatsLevel::State => medfinder.state_stats(&params, user)?,
                StatsLevel::County => {
                    let Some(state_id) = state_id else {
                        bail!("--state-id is required for county stats");
                    };
                    medfinder.county_stats(state_id, &params, user)?
                }
                StatsLevel::Zipcode => {
                    let Some(zipcode) = zipcode else {
                        bail!("--zipcode is required for zipcode stats");
                    };
                    medfinder.zipcode_stats(&zipcode, &params, user)?
                }
            };
            print_json(&value)?;
        }
        Commands::Historic { series, query } => {
            let params = QueryParams::parse(&query);
            match series {
                HistoricSeries::Average => print_json(&medfinder.historic_average(&params, user)?)?,
                HistoricSeries::Overall => print_json(&medfinder.historic_overall(&params, user)?)?,
            }
        }
        Commands::Search { query } => {
            let value = medfinder.find_providers(&QueryParams::parse(&query))?;
            print_json(&value)?;
        }
        Commands::Names { query, limit } => {
            print_json(&medfinder.search_medication_names(&query, limit)?)?;
        }
        Commands::Epidemic { active } => {
            let Some(user) = user else {
                bail!("--user is required to change the epidemic flag");
            };
            medfinder.set_epidemic(active, user)?;
            print_json(&medfinder.epidemic_info()?)?;
        }
        Commands::Housekeeping => {
            let report = medfinder.run_housekeeping(chrono::Utc::now())?;
            print_json(&report)?;
        }
        Commands::RebuildLatest => {
            let latest = medfinder.rebuild_latest()?;
            print_json(&serde_json::json!({ "latest": latest }))?;
        }
    }

    Ok(())
}
