// SPDX-License-Identifier: GPL-3.0-or-later

//! This module contains the command line interface of the application.
//!
//! The command line parsing is implemented using the `clap` library.
//! The module is defining types to represent a structured form of the
//! program invocation. The `Arguments` type is used to represent all
//! possible invocations of the program.

use anyhow::anyhow;
use clap::{ArgAction, ArgMatches, Command, arg, command};
use std::fmt;

/// Common constants used in the module.
const MODE_PARSE_SUBCOMMAND: &str = "parse";
const MODE_BUILTINS_SUBCOMMAND: &str = "builtins";
const MODE_DATABASE_SUBCOMMAND: &str = "database";

/// Represents the command line arguments of the application.
#[derive(Debug, PartialEq)]
pub struct Arguments {
    // The path of the configuration file.
    pub config: Option<String>,
    // The path of the persisted provider state.
    pub state: Option<String>,
    // The path of the result file, standard output when missing.
    pub output: Option<String>,
    // The mode of the application.
    pub mode: Mode,
}

/// Represents the mode of the application.
#[derive(Debug, PartialEq)]
pub enum Mode {
    /// Feed a build log through a build output parser.
    Parse { input: Option<String>, provider: Option<String> },
    /// Probe the compilers for their builtin settings.
    Builtins { provider: Option<String>, force: bool },
    /// Read the compilation database.
    Database { provider: Option<String>, force: bool },
}

impl TryFrom<ArgMatches> for Arguments {
    type Error = anyhow::Error;

    fn try_from(matches: ArgMatches) -> Result<Self, Self::Error> {
        let config = matches.get_one::<String>("config").map(String::to_string);
        let state = matches.get_one::<String>("state").map(String::to_string);
        let output = matches.get_one::<String>("output").map(String::to_string);

        let mode = match matches.subcommand() {
            Some((MODE_PARSE_SUBCOMMAND, parse_matches)) => Mode::Parse {
                input: parse_matches.get_one::<String>("input").map(String::to_string),
                provider: provider(parse_matches),
            },
            Some((MODE_BUILTINS_SUBCOMMAND, builtins_matches)) => {
                Mode::Builtins { provider: provider(builtins_matches), force: force(builtins_matches) }
            }
            Some((MODE_DATABASE_SUBCOMMAND, database_matches)) => {
                Mode::Database { provider: provider(database_matches), force: force(database_matches) }
            }
            Some((name, _)) => return Err(anyhow!("unrecognized subcommand: {name}")),
            None => return Err(anyhow!("missing subcommand")),
        };
        Ok(Arguments { config, state, output, mode })
    }
}

fn provider(matches: &ArgMatches) -> Option<String> {
    matches.get_one::<String>("provider").map(String::to_string)
}

fn force(matches: &ArgMatches) -> bool {
    matches.get_flag("force")
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let describe = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

        writeln!(f, "Arguments:")?;
        writeln!(f, "  config: {}", describe(&self.config))?;
        writeln!(f, "  state: {}", describe(&self.state))?;
        writeln!(f, "  output: {}", describe(&self.output))?;
        match &self.mode {
            Mode::Parse { input, provider } => {
                writeln!(f, "  mode: parse (input: {}, provider: {})", describe(input), describe(provider))
            }
            Mode::Builtins { provider, force } => {
                writeln!(f, "  mode: builtins (provider: {}, force: {force})", describe(provider))
            }
            Mode::Database { provider, force } => {
                writeln!(f, "  mode: database (provider: {}, force: {force})", describe(provider))
            }
        }
    }
}

/// Represents the command line interface of the application.
///
/// Every mode is a subcommand. The state file connects the invocations:
/// entries and re-run signatures are loaded from it at start and written
/// back when the mode finished.
pub fn cli() -> Command {
    let provider = || arg!(-p --provider <ID> "Identifier of the provider to run");
    let force = || arg!(-f --force "Run even if nothing changed since the last run").action(ArgAction::SetTrue);

    command!()
        .subcommand_required(true)
        .arg_required_else_help(true)
        .args(&[
            arg!(-c --config <FILE> "Path of the config file").global(true),
            arg!(-s --state <FILE> "Path of the provider state file").global(true),
            arg!(-o --output <FILE> "Path of the result file, standard output by default").global(true),
        ])
        .subcommand(
            Command::new(MODE_PARSE_SUBCOMMAND)
                .about("collect settings from the output of a build")
                .args(&[arg!(-i --input <FILE> "Path of the build log, standard input by default"), provider()]),
        )
        .subcommand(
            Command::new(MODE_BUILTINS_SUBCOMMAND)
                .about("detect the builtin settings of the compilers")
                .args(&[provider(), force()]),
        )
        .subcommand(
            Command::new(MODE_DATABASE_SUBCOMMAND)
                .about("collect settings from a compilation database")
                .args(&[provider(), force()]),
        )
}
