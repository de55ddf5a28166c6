use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::ArgMatches;
use tsgw_config::{Config, OverridableConfig};

use crate::cliapp::make_app;
use crate::setup;

/// The config folder used when no `--config` is given.
const DEFAULT_CONFIG_PATH: &str = ".tsgw";

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new(DEFAULT_CONFIG_PATH), PathBuf::as_path);

    let mut config = Config::from_path(config_path)?;
    tsgw_log::init(config.logging());

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            config.apply_override(extract_config_args(run_matches))?;
            run(config)
        }
        Some(("config", config_matches)) => manage_config(&config, config_matches),
        _ => bail!("unknown command"),
    }
}

/// Extracts config overrides from the arguments of the `run` command.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    let arg = |name| matches.get_one::<String>(name).cloned();

    OverridableConfig {
        host: arg("host"),
        port: arg("port"),
        statsd: arg("statsd"),
        public_org_id: arg("public_org"),
        publish_url: arg("publish_url"),
        search_url: arg("search_url"),
    }
}

pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("init", _)) => init_config(config),
        Some(("show", show_matches)) => show_config(config, show_matches),
        _ => bail!("unknown config subcommand"),
    }
}

#[allow(clippy::print_stdout)]
fn init_config(config: &Config) -> Result<()> {
    if Config::config_exists(config.path()) {
        println!("config already exists in {}", config.path().display());
        return Ok(());
    }

    config.save_in_folder(config.path())?;
    println!("all done, config written to {}", config.path().display());

    Ok(())
}

#[allow(clippy::print_stdout)]
fn show_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.get_one::<String>("format").map(String::as_str) {
        Some("debug") => println!("{config:#?}"),
        Some("yaml") | None => println!("{}", config.to_yaml_string()?),
        Some(other) => bail!("unknown format {other}"),
    }

    Ok(())
}

pub fn run(config: Config) -> Result<()> {
    setup::check_config(&config)?;
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;

    tsgw_server::run(config)?;

    Ok(())
}
