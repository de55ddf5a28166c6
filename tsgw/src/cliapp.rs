// This module implements the definition of the command line app.
//
// It must not have any other imports so that the definition stays independent of the gateway
// crates.
use std::path::PathBuf;

use clap::{Arg, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Metrics ingestion gateway with per-organization authentication.";

pub fn make_app() -> Command {
    Command::new("tsgw")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("TSGW_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the gateway")
                .after_help(
                    "This runs the gateway in the foreground until it's shut down. It will bind \
                     to the port and network interface configured in the config file.",
                )
                .arg(
                    Arg::new("host")
                        .value_name("HOST")
                        .long("host")
                        .short('H')
                        .env("TSGW_HOST")
                        .help("The network interface to bind to."),
                )
                .arg(
                    Arg::new("port")
                        .value_name("PORT")
                        .long("port")
                        .short('P')
                        .env("TSGW_PORT")
                        .help("The port to bind the HTTP server to."),
                )
                .arg(
                    Arg::new("statsd")
                        .value_name("ADDR")
                        .long("statsd")
                        .env("TSGW_STATSD")
                        .help("Host and port of the statsd server. Pass an empty value to disable."),
                )
                .arg(
                    Arg::new("public_org")
                        .value_name("ORG_ID")
                        .long("public-org")
                        .env("TSGW_PUBLIC_ORG")
                        .allow_negative_numbers(true)
                        .help("The organization receiving copies of public metrics, -1 to disable."),
                )
                .arg(
                    Arg::new("publish_url")
                        .value_name("URL")
                        .long("publish-url")
                        .env("TSGW_PUBLISH_URL")
                        .help("The endpoint accepted batches are published to."),
                )
                .arg(
                    Arg::new("search_url")
                        .value_name("URL")
                        .long("search-url")
                        .env("TSGW_SEARCH_URL")
                        .help("The base URL of the search cluster."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the gateway config")
                .after_help(
                    "This command provides basic config management. It can be used to \
                     initialize a new config folder and to print out the current config.",
                )
                .subcommand_required(true)
                .subcommand(
                    Command::new("init")
                        .about("Initialize a new gateway config")
                        .after_help(
                            "This writes a config file with all default values into the config \
                             folder. An existing config file is left untouched.",
                        ),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values which are \
                             not in the config file but filled in from defaults. The default \
                             output format is YAML but a debug format can also be specified \
                             which is useful to understand how the gateway interprets the \
                             individual values.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(["debug", "yaml"])
                                .default_value("yaml")
                                .help("The output format"),
                        ),
                ),
        )
}
