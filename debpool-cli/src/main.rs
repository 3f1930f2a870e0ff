use anyhow::{Error, Result};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use debpool::{
    Config, DebPoolError, NoProgress, Progress, ReleaseGenerator, Syncer, TerminalProgress,
    DEFAULT_BRANCH, DEFAULT_COMPONENT, DEFAULT_HOST, DEFAULT_LABEL, DEFAULT_OWNER,
    DEFAULT_PACKAGE_NAME, DEFAULT_PACKAGE_VERSION, DEFAULT_REPO, DEFAULT_REPO_ROOT,
};
use log::{error, info};
use std::io::{self, IsTerminal};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cmd = cmd();
    let matches = cmd.get_matches();
    let res = init_logger_from_matches(&matches);
    if let Err(e) = res {
        eprintln!("Error creating logger: {e}");
        std::process::exit(126);
    }

    let status = match matches.subcommand() {
        Some(("sync", sub)) => match run_sync(&matches, sub).await {
            Ok(()) => 0,
            Err(e) => exit_status_for(&e, "sync"),
        },
        Some(("release", sub)) => match run_release(sub) {
            Ok(()) => 0,
            Err(e) => exit_status_for(&e, "release"),
        },
        // clap rejects anything else because the subcommand is required.
        Some(_) | None => 127,
    };
    std::process::exit(status);
}

const MAX_TERM_WIDTH: usize = 100;

fn cmd() -> Command {
    Command::new("debpool")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Dave Rolsky <autarch@urth.org>")
        .about("Mirror GitHub release packages into an APT repository")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(sync_cmd())
        .subcommand(release_cmd())
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debugging output."),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Suppresses most output, including download progress."),
        )
        .group(ArgGroup::new("log-level").args(["debug", "quiet"]))
        .max_term_width(MAX_TERM_WIDTH)
}

fn sync_cmd() -> Command {
    Command::new("sync")
        .about(concat!(
            "Download the .deb assets of the latest release into the pool directory and remove",
            " every other file from it.",
        ))
        .arg(
            Arg::new("package-name")
                .long("package-name")
                .default_value(DEFAULT_PACKAGE_NAME)
                .help("The Debian package name used in pool file names."),
        )
        .arg(
            Arg::new("package-version")
                .long("package-version")
                .default_value(DEFAULT_PACKAGE_VERSION)
                .help(concat!(
                    "The Debian revision used in pool file names. Only bump this when a broken",
                    " package has to be replaced for the same upstream version.",
                )),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .default_value(DEFAULT_HOST)
                .help("The host of the release API."),
        )
        .arg(
            Arg::new("api-base-url")
                .long("api-base-url")
                .help(concat!(
                    "The base URL for the release API. This overrides --host and is useful for",
                    " testing or for GitHub Enterprise, where it looks something like",
                    " `https://github.my-corp.example.com/api/v3`.",
                )),
        )
        .arg(
            Arg::new("owner")
                .long("owner")
                .default_value(DEFAULT_OWNER)
                .help("The owner of the GitHub project to mirror."),
        )
        .arg(
            Arg::new("repo")
                .long("repo")
                .default_value(DEFAULT_REPO)
                .help("The name of the GitHub project to mirror."),
        )
        .arg(Arg::new("token").long("token").help(concat!(
            "A GitHub token for API and download requests. Defaults to the value of the",
            " GITHUB_TOKEN env var, if it is set.",
        )))
        .arg(repo_root_arg())
        .arg(component_arg())
}

fn release_cmd() -> Command {
    Command::new("release")
        .about(concat!(
            "Write the Release file for a distribution, listing the checksums of its Packages",
            " and Packages.gz files.",
        ))
        .arg(
            Arg::new("branch")
                .long("branch")
                .default_value(DEFAULT_BRANCH)
                .help("The distribution to describe. This is the directory under dists/."),
        )
        .arg(
            Arg::new("label")
                .long("label")
                .default_value(DEFAULT_LABEL)
                .help("The Origin, Label, and Description of the repository."),
        )
        .arg(repo_root_arg())
        .arg(component_arg())
}

fn repo_root_arg() -> Arg {
    Arg::new("repo-root")
        .long("repo-root")
        .short('r')
        .default_value(DEFAULT_REPO_ROOT)
        .help("The root directory of the APT repository.")
}

fn component_arg() -> Arg {
    Arg::new("component")
        .long("component")
        .default_value(DEFAULT_COMPONENT)
        .help("The repository component, e.g. main.")
}

pub(crate) fn init_logger_from_matches(matches: &ArgMatches) -> Result<(), log::SetLoggerError> {
    let level = if matches.get_flag("debug") {
        log::LevelFilter::Debug
    } else if matches.get_flag("quiet") {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };

    debpool::init_logger(level)
}

async fn run_sync(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let config = config_from_matches(sub);
    let progress: Box<dyn Progress> = if !matches.get_flag("quiet") && io::stderr().is_terminal() {
        Box::new(TerminalProgress)
    } else {
        Box::new(NoProgress)
    };

    let report = Syncer::new(config)?.with_progress(progress).sync().await?;
    info!(
        "Synced {}: {} downloaded, {} already present, {} removed",
        report.tag,
        report.downloaded.len(),
        report.already_present.len(),
        report.removed.len(),
    );
    Ok(())
}

fn run_release(sub: &ArgMatches) -> Result<()> {
    let generator = ReleaseGenerator::new(config_from_matches(sub))?;
    let text = generator.generate()?;
    print!("{text}");
    generator.write(&text)
}

fn config_from_matches(matches: &ArgMatches) -> Config {
    let mut config = Config::default();
    let string = |id: &str| {
        matches
            .try_get_one::<String>(id)
            .ok()
            .flatten()
            .cloned()
    };

    if let Some(v) = string("package-name") {
        config.package_name = v;
    }
    if let Some(v) = string("package-version") {
        config.package_version = v;
    }
    if let Some(v) = string("host") {
        config.host = v;
    }
    if let Some(v) = string("owner") {
        config.owner = v;
    }
    if let Some(v) = string("repo") {
        config.repo = v;
    }
    if let Some(v) = string("component") {
        config.component = v;
    }
    if let Some(v) = string("repo-root") {
        config.repo_root = v.into();
    }
    if let Some(v) = string("branch") {
        config.branch = v;
    }
    if let Some(v) = string("label") {
        config.label = v;
    }
    config.api_base_url = string("api-base-url");
    config.token = string("token");

    config
}

fn exit_status_for(e: &Error, subcommand: &str) -> i32 {
    print_err(e, subcommand);
    if let Some(DebPoolError::InvalidConfig(_)) = e.downcast_ref::<DebPoolError>() {
        127
    } else {
        1
    }
}

fn print_err(e: &Error, subcommand: &str) {
    error!("{e:#}");
    if let Some(DebPoolError::InvalidConfig(_)) = e.downcast_ref::<DebPoolError>() {
        println!();
        // There's nothing left to do if even the help can't be printed.
        let _ = subcommand_help(subcommand).print_help();
    }
}

// Building the parent first gives the subcommand its full `debpool <name>` usage line.
fn subcommand_help(subcommand: &str) -> Command {
    let mut cmd = cmd();
    cmd.build();
    cmd.find_subcommand(subcommand).cloned().unwrap_or(cmd)
}
