use std::process;

use chrono::Utc;
use clap::CommandFactory;
use tracing::error;
use tracing_subscriber::EnvFilter;

use check_puppetdb_nodes::check::{self, Thresholds};
use check_puppetdb_nodes::config::{self, Cli, Config};
use check_puppetdb_nodes::config_generator::CommandDescription;
use check_puppetdb_nodes::inventory::PuppetDbClient;
use check_puppetdb_nodes::{Runner, ServiceState};

const ICINGA_COMMAND_NAME: &str = "puppetdb_nodes";

fn main() {
    let cli = match Cli::try_parse_normalized(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) if config::is_help_or_version(&err) => err.exit(),
        Err(err) => config::usage_error(&err).print_and_exit(),
    };

    init_tracing(&cli.log_level);

    if cli.generate_icinga_command {
        print_icinga_command();
    }

    let config = Config::from(&cli);

    Runner::new()
        .on_error(|_| ServiceState::Unknown)
        .safe_run(|| {
            let thresholds =
                Thresholds::at(Utc::now(), config.warning_days, config.critical_days)?;
            let client = PuppetDbClient::new(&config)?;
            check::run(&client, &thresholds)
        })
        .print_and_exit()
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // stdout belongs to the plugin output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_icinga_command() -> ! {
    let generated = CommandDescription::from_command(&Cli::command(), ICINGA_COMMAND_NAME)
        .map_err(|e| e.to_string())
        .and_then(|d| {
            d.to_icinga_command(ICINGA_COMMAND_NAME)
                .map_err(|e| e.to_string())
        });

    match generated {
        Ok(out) => {
            println!("{}", out.trim());
            process::exit(0);
        }
        Err(err) => {
            error!(%err, "generating icinga command");
            process::exit(ServiceState::Unknown.exit_code());
        }
    }
}
