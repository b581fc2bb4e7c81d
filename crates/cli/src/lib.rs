pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::{quote::QuoteArgs, wizard::WizardArgs};

#[derive(Debug, Parser)]
#[command(
    name = "quoteflow",
    about = "Quoteflow operator CLI",
    long_about = "Inspect configuration, check readiness, run migrations, and exercise the quote \
                  calculator and wizard from the command line.",
    after_help = "Examples:\n  quoteflow doctor --json\n  quoteflow quote --tier starter \
                  --feature ecommerce --rush\n  quoteflow wizard --storage tab.json --script \
                  actions.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Validate config, catalog consistency, DB connectivity and migrations")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations, or revert them all")]
    Migrate {
        #[arg(long, help = "Roll back every applied migration instead")]
        revert: bool,
    },
    #[command(about = "Print the effective catalog, or one tier's bundle")]
    Catalog {
        #[arg(long, help = "Limit output to one tier (starter, pro, elite)")]
        tier: Option<String>,
    },
    #[command(about = "Price a tier and add-on selection")]
    Quote {
        #[arg(long)]
        tier: String,
        #[arg(long = "feature", help = "Add-on feature id; repeat for several")]
        features: Vec<String>,
        #[arg(long, help = "Request rush delivery")]
        rush: bool,
        #[arg(long = "plan", help = "Maintenance plan id (defaults to the catalog default)")]
        maintenance_plan: Option<String>,
        #[arg(long, help = "Include the step-by-step pricing trace")]
        trace: bool,
    },
    #[command(about = "Replay wizard actions against file-backed tab storage")]
    Wizard {
        #[arg(long, help = "JSON file holding the tab's wizard state")]
        storage: PathBuf,
        #[arg(long, help = "JSON array of wizard actions to dispatch")]
        script: Option<PathBuf>,
        #[arg(long, help = "Reset the wizard before replaying the script")]
        reset: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config { json } => commands::config::run(json),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Migrate { revert } => commands::migrate::run(revert),
        Command::Catalog { tier } => commands::catalog::run(tier.as_deref()),
        Command::Quote { tier, features, rush, maintenance_plan, trace } => {
            commands::quote::run(QuoteArgs { tier, features, rush, maintenance_plan, trace })
        }
        Command::Wizard { storage, script, reset } => {
            commands::wizard::run(WizardArgs { storage, script, reset })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
