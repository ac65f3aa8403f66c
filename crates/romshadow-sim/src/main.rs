/// RomShadow simulator: exercise shadowed firmware dialogs on the host
///
/// Commands:
///   run [scenario]   build the dialog a scenario describes and drive its event loop
///   layout [--json]  print the table and object layouts with their device sizes

mod session;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use romshadow_common::{AppConfig, Scenario};
use romshadow_gui::LayoutReport;

#[derive(Parser)]
#[command(name = "romshadow")]
#[command(about = "Run shadowed firmware dialogs against the simulator", long_about = None)]
struct Cli {
    /// Application config file
    #[arg(long, default_value = "romshadow.toml")]
    config: PathBuf,

    /// Log level for romshadow crates (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted dialog session
    Run {
        /// Scenario file; defaults to the one named in the config file
        scenario: Option<PathBuf>,

        /// Print the session report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show dispatch table and object layouts
    Layout {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(format!("romshadow={}", level).parse()?))
        .init();

    tracing::info!("RomShadow simulator v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { scenario, json } => cmd_run(scenario, &config, json),
        Commands::Layout { json } => cmd_layout(json),
    }
}

fn cmd_run(scenario: Option<PathBuf>, config: &AppConfig, json: bool) -> Result<()> {
    let Some(path) = scenario.or_else(|| config.default_scenario.clone()) else {
        anyhow::bail!(
            "No scenario given.\n\n\
             Pass one as argument:  romshadow run <scenario.toml>\n\
             or set `default_scenario` in the config file."
        );
    };

    let scenario = Scenario::load(&path).with_context(|| format!("Failed to load scenario {}", path.display()))?;
    tracing::info!(
        "Scenario {}: {} text box(es), {} input event(s)",
        path.display(),
        scenario.text_boxes.len(),
        scenario.input_count()
    );

    let report = session::run(&scenario)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn cmd_layout(json: bool) -> Result<()> {
    let report = LayoutReport::collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_and_layout() {
        let cli = Cli::parse_from(["romshadow", "--log-level", "debug", "run", "demo.toml", "--json"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Run { scenario: Some(_), json: true }));

        let cli = Cli::parse_from(["romshadow", "layout"]);
        assert!(matches!(cli.command, Commands::Layout { json: false }));
    }

    #[test]
    fn test_run_without_scenario_fails() {
        let err = cmd_run(None, &AppConfig::default(), false).unwrap_err();
        assert!(err.to_string().contains("No scenario given"));
    }
}
