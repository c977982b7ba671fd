use std::path::PathBuf;

use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

use tc_extract::catalog::Catalog;
use tc_extract::clean::clean;
use tc_extract::config::Config;
use tc_extract::data_io::writer::{read_table, write_table};
use tc_extract::extract::extract;

fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_count("verbose"));

    let result = match matches.subcommand() {
        Some(("extract", sub_matches)) => run_extract(sub_matches),
        Some(("clean", sub_matches)) => run_clean(sub_matches),
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Map the -v count onto a default filter; RUST_LOG overrides when set
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tc_extract={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_cli() -> Command {
    Command::new("tc_extract")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Environmental-variable extraction at tropical cyclone locations")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v info, -vv debug, -vvv trace)"),
        )
        .subcommand(
            Command::new("extract")
                .about("Extract environmental variables for one basin into a training table")
                .arg(
                    Arg::new("basin")
                        .short('b')
                        .long("basin")
                        .value_name("CODE")
                        .help("Basin code (NA, EP, WP, NI, SI, SP, SA)")
                        .required(true),
                )
                .arg(
                    Arg::new("data-root")
                        .short('d')
                        .long("data-root")
                        .value_name("DIR")
                        .help("Root of the monthly reanalysis data tree")
                        .required(true),
                )
                .arg(
                    Arg::new("tracks")
                        .short('t')
                        .long("tracks")
                        .value_name("FILE")
                        .help("Best-track archive CSV")
                        .required(true),
                )
                .arg(
                    Arg::new("start-year")
                        .short('s')
                        .long("start-year")
                        .value_name("YEAR")
                        .default_value("1980"),
                )
                .arg(
                    Arg::new("end-year")
                        .short('e')
                        .long("end-year")
                        .value_name("YEAR")
                        .default_value("2020"),
                )
                .arg(
                    Arg::new("min-wind-ms")
                        .long("min-wind-ms")
                        .value_name("MS")
                        .help("Minimum sustained wind for an observation to be kept")
                        .default_value("17.0"),
                )
                .arg(
                    Arg::new("max-workers")
                        .short('j')
                        .long("max-workers")
                        .value_name("COUNT")
                        .help("Worker threads; 1 = sequential (safe default for unproven native libraries)")
                        .default_value("1"),
                )
                .arg(
                    Arg::new("chunk-start")
                        .long("chunk-start")
                        .value_name("INDEX")
                        .help("First observation index for a resumable partial run"),
                )
                .arg(
                    Arg::new("chunk-size")
                        .long("chunk-size")
                        .value_name("COUNT")
                        .help("Number of observations in this partial run"),
                )
                .arg(
                    Arg::new("failure-rate-threshold")
                        .long("failure-rate-threshold")
                        .value_name("FRACTION")
                        .help("Sample failure rate above which the whole run fails")
                        .default_value("0.5"),
                )
                .arg(
                    Arg::new("pi-bound-policy")
                        .long("pi-bound-policy")
                        .value_name("POLICY")
                        .value_parser(["drop", "retain-flagged"])
                        .help("Handling of PI values outside [0, 90] m/s")
                        .default_value("drop"),
                )
                .arg(
                    Arg::new("bathymetry")
                        .long("bathymetry")
                        .value_name("FILE")
                        .help("Optional bathymetry grid; adds an ocean-depth column"),
                )
                .arg(
                    Arg::new("target-resolution")
                        .long("target-resolution")
                        .value_name("DEGREES")
                        .help("Regular grid resolution for ocean regridding")
                        .default_value("0.25"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Output table path (default: tc_training_data_<BASIN>.csv)"),
                ),
        )
        .subcommand(
            Command::new("clean")
                .about("Drop rows with missing translation speed, SST, or PI from a table")
                .arg(
                    Arg::new("input")
                        .value_name("FILE")
                        .help("Training table to clean")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Cleaned table path (default: rewrite input in place)"),
                ),
        )
}

fn run_extract(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = Config::from_matches(matches).map_err(anyhow::Error::msg)?;

    let catalog = Catalog::build(&config.data_root, config.start_year, config.end_year)
        .context("building the monthly data catalog")?;

    let outcome = extract(&config, &catalog).context("basin extraction")?;

    let output_path = config.resolved_output_path();
    write_table(&output_path, &outcome.rows)
        .with_context(|| format!("writing {}", output_path.display()))?;

    print!("{}", outcome.summary);
    println!("Table written to {}", output_path.display());
    Ok(())
}

fn run_clean(matches: &ArgMatches) -> anyhow::Result<()> {
    let input = PathBuf::from(matches.get_one::<String>("input").unwrap());
    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| input.clone());

    let rows = read_table(&input).with_context(|| format!("reading {}", input.display()))?;
    let (kept, report) = clean(rows);
    write_table(&output, &kept).with_context(|| format!("writing {}", output.display()))?;

    print!("{}", report);
    println!("Cleaned table written to {}", output.display());
    Ok(())
}
