//! The `mthds` binary: argument parsing, logger setup, and error-to-exit-code
//! conversion. All real work happens in the library's `cli` module.

extern crate clap;
extern crate mthds;
#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use slog::{Drain, Logger};
use std::path::PathBuf;
use std::{env, process};

use mthds::cli::add::{add, AddCtx};
use mthds::cli::config::{config, ConfigCtx, ConfigOp};
use mthds::cli::init::{init, InitCtx};
use mthds::cli::install::{install, InstallCtx};
use mthds::cli::list::{list, ListCtx};
use mthds::cli::lock::{lock, LockCtx};
use mthds::cli::update::{update, UpdateCtx};
use mthds::cli::validate::{validate, ValidateCtx};
use mthds::credentials::CredentialsStore;
use mthds::retrieve::cache::Cache;
use mthds::retrieve::vcs::GitCli;
use mthds::util::errors::Res;

fn main() {
    let logger = logger();
    let matches = app().get_matches();

    if let Err(err) = dispatch(&logger, &matches) {
        eprintln!("error: {}", err);
        for cause in err.iter_causes() {
            eprintln!("  caused by: {}", cause);
        }
        process::exit(1);
    }
}

fn logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn dir_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("directory")
        .short("d")
        .long("directory")
        .takes_value(true)
        .help("Target package directory (defaults to the current directory)")
}

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("mthds")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A source-based package manager for MTHDS pipeline bundles")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("init")
                .about("Initialize a METHODS.toml manifest")
                .arg(dir_arg())
                .arg(
                    Arg::with_name("force")
                        .short("f")
                        .long("force")
                        .help("Overwrite an existing METHODS.toml"),
                ),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("Display the package manifest")
                .arg(dir_arg()),
        )
        .subcommand(
            SubCommand::with_name("add")
                .about("Add a dependency to METHODS.toml")
                .arg(
                    Arg::with_name("address")
                        .required(true)
                        .help("Package address (e.g. 'github.com/org/repo')"),
                )
                .arg(
                    Arg::with_name("alias")
                        .short("a")
                        .long("alias")
                        .takes_value(true)
                        .help("Dependency alias (derived from the address if omitted)"),
                )
                .arg(
                    Arg::with_name("version")
                        .short("v")
                        .long("version")
                        .takes_value(true)
                        .default_value("0.1.0")
                        .help("Version constraint"),
                )
                .arg(
                    Arg::with_name("path")
                        .short("p")
                        .long("path")
                        .takes_value(true)
                        .help("Local filesystem path override"),
                )
                .arg(dir_arg()),
        )
        .subcommand(
            SubCommand::with_name("lock")
                .about("Resolve dependencies and write methods.lock")
                .arg(dir_arg()),
        )
        .subcommand(
            SubCommand::with_name("install")
                .about("Fetch locked packages and verify their hashes")
                .arg(dir_arg()),
        )
        .subcommand(
            SubCommand::with_name("update")
                .about("Re-resolve dependencies and rewrite methods.lock")
                .arg(dir_arg()),
        )
        .subcommand(
            SubCommand::with_name("validate")
                .about("Validate the manifest and check pipe visibility")
                .arg(dir_arg()),
        )
        .subcommand(
            SubCommand::with_name("config")
                .about("Read or write mthds credentials")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("get")
                        .about("Print one credential value")
                        .arg(Arg::with_name("key").required(true)),
                )
                .subcommand(
                    SubCommand::with_name("set")
                        .about("Set one credential value")
                        .arg(Arg::with_name("key").required(true))
                        .arg(Arg::with_name("value").required(true)),
                )
                .subcommand(SubCommand::with_name("list").about("Print all credential values")),
        )
}

fn target_dir(matches: &ArgMatches) -> Res<PathBuf> {
    match matches.value_of("directory") {
        Some(directory) => Ok(PathBuf::from(directory)),
        None => {
            let cwd = env::current_dir()?;
            Ok(cwd)
        }
    }
}

fn dispatch(logger: &Logger, matches: &ArgMatches) -> Res<()> {
    match matches.subcommand() {
        ("init", Some(sub)) => init(InitCtx {
            path: target_dir(sub)?,
            force: sub.is_present("force"),
        }),
        ("list", Some(sub)) => list(ListCtx {
            path: target_dir(sub)?,
        }),
        ("add", Some(sub)) => add(AddCtx {
            path: target_dir(sub)?,
            address: sub.value_of("address").unwrap().to_string(),
            alias: sub.value_of("alias").map(|s| s.to_string()),
            version: sub.value_of("version").unwrap().to_string(),
            dep_path: sub.value_of("path").map(PathBuf::from),
        }),
        ("lock", Some(sub)) => {
            let cache = Cache::from_disk(logger, Cache::default_root());
            let vcs = GitCli::new(logger);
            lock(LockCtx {
                path: target_dir(sub)?,
                cache: &cache,
                vcs: &vcs,
                logger: logger.clone(),
            })
        }
        ("install", Some(sub)) => {
            let cache = Cache::from_disk(logger, Cache::default_root());
            let vcs = GitCli::new(logger);
            install(InstallCtx {
                path: target_dir(sub)?,
                cache: &cache,
                vcs: &vcs,
                logger: logger.clone(),
            })
        }
        ("update", Some(sub)) => {
            let cache = Cache::from_disk(logger, Cache::default_root());
            let vcs = GitCli::new(logger);
            update(UpdateCtx {
                path: target_dir(sub)?,
                cache: &cache,
                vcs: &vcs,
                logger: logger.clone(),
            })
        }
        ("validate", Some(sub)) => validate(ValidateCtx {
            path: target_dir(sub)?,
            logger: logger.clone(),
        }),
        ("config", Some(sub)) => {
            let op = match sub.subcommand() {
                ("get", Some(op)) => ConfigOp::Get {
                    key: op.value_of("key").unwrap().to_string(),
                },
                ("set", Some(op)) => ConfigOp::Set {
                    key: op.value_of("key").unwrap().to_string(),
                    value: op.value_of("value").unwrap().to_string(),
                },
                ("list", _) => ConfigOp::List,
                _ => unreachable!("clap enforces a config subcommand"),
            };
            config(ConfigCtx {
                store: CredentialsStore::new(),
                op,
            })
        }
        _ => unreachable!("clap enforces a subcommand"),
    }
}
