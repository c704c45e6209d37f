use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

use daily_read::app::{self, App, GenerateOptions};
use daily_read::config::{Config, ConfigLoader};
use daily_read::diagnostics::Diagnostics;
use daily_read::domain::PublishState;
use daily_read::error::DailyReadError;
use daily_read::master::DataMaster;
use daily_read::order_portal::OrderPortalHttpClient;
use daily_read::output::JsonOutput;
use daily_read::reports::DirectoryReports;

#[derive(Parser)]
#[command(name = "daily-read")]
#[command(about = "Daily project progress reports from facility status databases to the order portal")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch project data and save it to the data location without reporting")]
    Fetch,
    #[command(about = "Fetch data and publish progress reports for changed projects")]
    Generate(GenerateArgs),
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long, help = "Upload and delete reports; without it the run only reports the plan")]
    upload: bool,

    #[arg(long, default_value = "reports")]
    report_dir: Utf8PathBuf,

    #[arg(long, value_enum, default_value_t = PublishState::Published)]
    publish_state: PublishState,
}

fn main() -> ExitCode {
    let diagnostics = Diagnostics::new();
    if let Err(report) = run(&diagnostics) {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<DailyReadError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DailyReadError) -> u8 {
    match error {
        DailyReadError::Configuration(_) => 2,
        error if error.is_external() => 3,
        DailyReadError::Consistency(_) | DailyReadError::Validation(_) => 4,
        DailyReadError::ErrorsLogged(_) => 5,
        _ => 1,
    }
}

fn run(diagnostics: &Diagnostics) -> miette::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    diagnostics.subscriber(filter).init();
    let _run = tracing::info_span!("daily_read", version = env!("CARGO_PKG_VERSION")).entered();

    let cli = Cli::parse();
    let config = ConfigLoader::from_env()?;
    let mut master = DataMaster::from_config(&config)?;

    match cli.command {
        Commands::Fetch => run_fetch(&mut master)?,
        Commands::Generate(args) => run_generate(config, &mut master, args)?,
    }

    diagnostics.finish()?;
    Ok(())
}

fn run_fetch(master: &mut DataMaster) -> miette::Result<()> {
    let result = app::fetch(master)?;
    JsonOutput::print_fetch(&result).into_diagnostic()?;
    Ok(())
}

fn run_generate(config: Config, master: &mut DataMaster, args: GenerateArgs) -> miette::Result<()> {
    let portal = OrderPortalHttpClient::new(
        config.order_portal_url.as_deref().unwrap_or_default(),
        config.order_portal_api_key.as_deref().unwrap_or_default(),
    )?;
    let reports = DirectoryReports::new(args.report_dir);
    let app = App::new(config, portal, reports);
    let options = GenerateOptions {
        upload: args.upload,
        publish_state: args.publish_state,
    };
    let result = app.generate(master, &options)?;
    JsonOutput::print_generate(&result).into_diagnostic()?;
    Ok(())
}
