use beacon::{
    context::AppContextBuilder,
    delivery::{DeliveryChannel, DeliveryOutcome, OutboundMessage},
    models::{IncidentEvent, Severity},
    supervisor::Supervisor,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Directory containing `app.yaml`.
    #[arg(long, env = "BEACON_CONFIG_DIR")]
    config_dir: Option<String>,

    /// Overrides `database_url` from the configuration.
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the alerting pipeline until SIGINT or SIGTERM.
    Run(CommonArgs),
    /// Sends one test alert synchronously and reports the delivery outcome.
    SendTest(CommonArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_supervisor(args).await?,
        Commands::SendTest(args) => send_test(args).await?,
    }

    Ok(())
}

fn context_builder(args: CommonArgs) -> AppContextBuilder {
    let builder = AppContextBuilder::new(args.config_dir);
    match args.database_url {
        Some(url) => builder.database_url(url),
        None => builder,
    }
}

async fn run_supervisor(args: CommonArgs) -> Result<(), Box<dyn std::error::Error>> {
    let context = context_builder(args).build().await?;
    let supervisor = Supervisor::builder().context(context).build().await?;

    tracing::info!("Supervisor initialized, starting pipeline...");
    let report = supervisor.run().await?;
    if report.abandoned > 0 {
        tracing::warn!(abandoned = report.abandoned, "Exited with abandoned deliveries.");
    }
    Ok(())
}

async fn send_test(args: CommonArgs) -> Result<(), Box<dyn std::error::Error>> {
    let context = context_builder(args).build().await?;
    let config = &context.config;
    if !config.enabled {
        return Err("monitoring is disabled, nothing to send".into());
    }

    let channel = DeliveryChannel::new(&config.telegram, &config.delivery, context.http_client)?;
    let event = IncidentEvent::error("beacon send-test", "TestAlert", "Delivery check from the CLI.")
        .with_severity(Severity::Info);
    let message = OutboundMessage::from_incident(&event, &config.environment);

    match channel.send(message).await {
        DeliveryOutcome::Delivered { attempts } => {
            println!("Delivered after {attempts} attempt(s).");
            Ok(())
        }
        DeliveryOutcome::Failed { kind, attempts } => {
            Err(format!("delivery failed ({kind:?}) after {attempts} attempt(s)").into())
        }
    }
}
