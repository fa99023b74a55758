use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use selfheal_core::{write_artifacts, FinalStatus, HarnessConfig, Orchestrator, ReportGenerator};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit code for infrastructure failures
const EXIT_FATAL: i32 = 2;

fn cli() -> Command {
    Command::new("selfheal")
        .version(selfheal_core::VERSION)
        .about("Autonomous UI test-and-repair harness")
        .arg(
            Arg::new("headless")
                .long("headless")
                .value_name("BOOL")
                .value_parser(value_parser!(bool))
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("true")
                .help("Run the browser without a window (--headless=false shows it)"),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .value_parser(value_parser!(u32))
                .help("Maximum number of test/fix cycles [default: 5]"),
        )
        .arg(
            Arg::new("url")
                .long("url")
                .value_name("BASE_URL")
                .help("Base URL of the application under test"),
        )
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .value_name("URL")
                .help("Backend API origin"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Log driver detail"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory for report artifacts"),
        )
        .arg(
            Arg::new("project-root")
                .long("project-root")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Root of the application source tree that fixes may patch"),
        )
        .arg(
            Arg::new("cooldown-ms")
                .long("cooldown-ms")
                .value_parser(value_parser!(u64))
                .help("Pause between cycles in milliseconds"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Show file patches without writing them"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_parser(["text", "json"])
                .default_value("text")
                .help("Log output format"),
        )
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<HarnessConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    if let Some(headless) = args.get_one::<bool>("headless") {
        config = config.with_headless(*headless);
    }
    if let Some(retries) = args.get_one::<u32>("retries") {
        config = config.with_max_retries(*retries);
    }
    if let Some(url) = args.get_one::<String>("url") {
        config = config.with_base_url(url.as_str());
    }
    if let Some(url) = args.get_one::<String>("api-url") {
        config = config.with_api_base_url(url.as_str());
    }
    if let Some(dir) = args.get_one::<PathBuf>("output") {
        config = config.with_output_dir(dir);
    }
    if let Some(dir) = args.get_one::<PathBuf>("project-root") {
        config = config.with_project_root(dir);
    }
    if let Some(ms) = args.get_one::<u64>("cooldown-ms") {
        config = config.with_cooldown_ms(*ms);
    }
    if args.get_flag("dry-run") {
        config = config.with_dry_run(true);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run(args: &ArgMatches) -> anyhow::Result<FinalStatus> {
    let config = load_config(args)?;
    let output_dir = config.output_dir.clone();
    let orchestrator = Orchestrator::new(config);

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⚠ interrupt received; stopping after the current step");
            cancel.cancel();
        }
    });

    let result = orchestrator.run().await.context("self-healing run failed")?;

    println!("{}", ReportGenerator::new(&result).generate_text());

    let paths = write_artifacts(&result, &output_dir)
        .await
        .context("writing report artifacts")?;
    tracing::info!("→ HTML report: {}", paths.html.display());
    tracing::info!("→ JSON result: {}", paths.json.display());

    Ok(result.final_status)
}

#[tokio::main]
async fn main() {
    let args = cli().get_matches();
    init_tracing(
        args.get_flag("verbose"),
        args.get_one::<String>("log-format").is_some_and(|f| f == "json"),
    );

    match run(&args).await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            tracing::error!("✗ {:#}", e);
            std::process::exit(EXIT_FATAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let args = cli()
            .try_get_matches_from([
                "selfheal",
                "--retries",
                "2",
                "--url",
                "http://127.0.0.1:4000",
                "--cooldown-ms",
                "0",
                "--dry-run",
            ])
            .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_url, "http://127.0.0.1:4000");
        assert_eq!(config.cooldown_ms, 0);
        assert!(config.dry_run);
    }

    #[test]
    fn headless_accepts_an_explicit_value() {
        let parse = |argv: &[&str]| {
            let args = cli().try_get_matches_from(argv.iter().copied()).unwrap();
            load_config(&args).unwrap()
        };

        assert!(!parse(&["selfheal", "--headless=false"]).browser.headless);
        assert!(parse(&["selfheal", "--headless"]).browser.headless);
        assert!(parse(&["selfheal", "--headless=true"]).browser.headless);
        assert!(cli()
            .try_get_matches_from(["selfheal", "--headless=maybe"])
            .is_err());
    }

    #[test]
    fn zero_retries_is_rejected() {
        let args = cli()
            .try_get_matches_from(["selfheal", "--retries", "0"])
            .unwrap();
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(cli()
            .try_get_matches_from(["selfheal", "--log-format", "xml"])
            .is_err());
    }
}
