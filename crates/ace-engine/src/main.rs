//! `ace` command-line tool

use ace_core::{
    convert_to_unified_diff, event_channel, CancellationToken, ChangeRequest, EngineEvent,
    EventReceiver, ProcessOptions,
};
use ace_engine::{AceConfig, EngineFactory, EngineKind};
use ace_opencode::EnvLookup;
use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// How long to wait for buffered events after a call returns
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

fn cli() -> Command {
    Command::new("ace")
        .version(ace_engine::VERSION)
        .about("Run AI coding engines against a repository")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file (default: ./ace.toml when present)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("More log output (-v info, -vv debug, -vvv trace)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Write logs to stderr as JSON"),
        )
        .subcommand(
            Command::new("apply")
                .about("Apply an instruction to a repository")
                .arg(
                    Arg::new("instruction")
                        .required(true)
                        .help("What to change"),
                )
                .arg(
                    Arg::new("repo")
                        .long("repo")
                        .short('r')
                        .value_parser(value_parser!(PathBuf))
                        .help("Repository to work in (default: current directory)"),
                )
                .arg(
                    Arg::new("engine")
                        .long("engine")
                        .short('e')
                        .help("Engine: opencode, claude-code or aider"),
                )
                .arg(
                    Arg::new("context")
                        .long("context")
                        .short('c')
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(PathBuf))
                        .help("File to draw the engine's attention to, repeatable"),
                )
                .arg(Arg::new("model").long("model").short('m').help("Model override"))
                .arg(
                    Arg::new("preview")
                        .long("preview")
                        .action(ArgAction::SetTrue)
                        .help("Propose changes without writing files"),
                )
                .arg(
                    Arg::new("chat-only")
                        .long("chat-only")
                        .action(ArgAction::SetTrue)
                        .help("Answer without editing"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(value_parser!(u64))
                        .help("Deadline in seconds"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print events as JSON lines instead of the diff"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check an instruction against the safety rules")
                .arg(Arg::new("instruction").required(true)),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert SEARCH/REPLACE output to a unified diff")
                .arg(
                    Arg::new("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Input file (default: stdin)"),
                ),
        )
        .subcommand(Command::new("engines").about("List engines and their models"))
        .subcommand(Command::new("serve").about("Run the OpenCode server until interrupted"))
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    if let Err(e) = init_logging(matches.get_count("verbose"), matches.get_flag("log-json")) {
        eprintln!("error: {e:#}");
        std::process::exit(2);
    }

    let code = match run(&matches).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn init_logging(verbosity: u8, json: bool) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).compact().init();
    }
    Ok(())
}

async fn run(matches: &ArgMatches) -> Result<i32> {
    match matches.subcommand() {
        Some(("apply", args)) => apply(args).await,
        Some(("validate", args)) => validate(args),
        Some(("convert", args)) => convert(args),
        Some(("engines", args)) => engines(args),
        Some(("serve", args)) => serve(args).await,
        _ => Ok(2),
    }
}

fn load_config(args: &ArgMatches) -> Result<AceConfig> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let explicit = args.get_one::<PathBuf>("config");
    let config = AceConfig::load(explicit.map(PathBuf::as_path), &cwd)?;
    Ok(config.with_env(&EnvLookup::process()))
}

fn overrides(args: &ArgMatches) -> ProcessOptions {
    let mut overrides = ProcessOptions::new();
    if let Some(model) = args.get_one::<String>("model") {
        overrides = overrides.with_model(model.clone());
    }
    if args.get_flag("preview") {
        overrides = overrides.with_preview(true);
    }
    if args.get_flag("chat-only") {
        overrides = overrides.with_chat_only(true);
    }
    if let Some(secs) = args.get_one::<u64>("timeout") {
        overrides = overrides.with_timeout_secs(*secs);
    }
    overrides
}

async fn apply(args: &ArgMatches) -> Result<i32> {
    let instruction = args
        .get_one::<String>("instruction")
        .context("instruction is required")?;
    let repo = match args.get_one::<PathBuf>("repo") {
        Some(repo) => repo.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let context: Vec<PathBuf> = args
        .get_many::<PathBuf>("context")
        .map(|files| files.cloned().collect())
        .unwrap_or_default();
    let json = args.get_flag("json");

    let factory = EngineFactory::new(load_config(args)?)?;
    let key = args
        .get_one::<String>("engine")
        .map_or(factory.config().engine_key(), String::as_str);
    let engine = factory.create_from_key(key)?;
    tracing::info!(engine = engine.name(), repo = %repo.display(), "applying instruction");

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = event_channel();
    let printer = tokio::spawn(print_events(rx, json));

    let request = ChangeRequest::new(instruction, &repo)
        .with_context_files(context)
        .with_overrides(overrides(args))
        .with_cancellation(cancel)
        .with_events(tx);
    let result = engine.apply(request).await;

    interrupt.abort();
    if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, printer).await.is_err() {
        tracing::debug!("event printer still running");
    }
    factory.shutdown().await;

    match result {
        Ok(summary) => {
            if !json {
                print!("{}", summary.unified_diff());
                eprintln!("{} ({} file(s))", summary.summary, summary.files.len());
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("error [{}]: {e}", e.kind().as_str());
            Ok(1)
        }
    }
}

async fn print_events(mut rx: EventReceiver, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("failed to encode event: {e}"),
            }
            continue;
        }
        match event {
            EngineEvent::Chat { message } => eprintln!("> {}", message.content),
            EngineEvent::Log { line } => tracing::debug!(target: "ace::output", "{line}"),
            EngineEvent::Changes { .. } => {}
            EngineEvent::Finished { termination } => {
                tracing::debug!(?termination, "engine finished");
            }
        }
    }
}

fn validate(args: &ArgMatches) -> Result<i32> {
    let instruction = args
        .get_one::<String>("instruction")
        .context("instruction is required")?;
    let validator = load_config(args)?.validator()?;

    match validator.validate(instruction) {
        Ok(()) => {
            println!("ok");
            Ok(0)
        }
        Err(violation) => {
            println!(
                "rejected [{}]: {}",
                violation.severity.as_str(),
                violation.description
            );
            Ok(1)
        }
    }
}

fn convert(args: &ArgMatches) -> Result<i32> {
    let input = match args.get_one::<PathBuf>("file") {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            input
        }
    };
    print!("{}", convert_to_unified_diff(&input));
    Ok(0)
}

fn engines(args: &ArgMatches) -> Result<i32> {
    let factory = EngineFactory::new(load_config(args)?)?;
    let selected = factory.config().engine_key().parse::<EngineKind>().ok();

    for kind in EngineKind::ALL {
        let marker = if selected == Some(kind) { "*" } else { " " };
        let models = factory.create(kind).supported_models().join(", ");
        println!("{marker} {:<12} {models}", kind.as_str());
    }
    Ok(0)
}

async fn serve(args: &ArgMatches) -> Result<i32> {
    let factory = EngineFactory::new(load_config(args)?)?;
    let handle = factory.server().start().await?;
    println!("{}", handle.url());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("shutting down");
    factory.shutdown().await;
    Ok(0)
}
