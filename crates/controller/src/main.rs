use anyhow::Result;
use clap::Parser;
use pfsense_controller::app::ApplicationBuilder;
use pfsense_controller::config::Cli;
use pfsense_controller::config::Commands;
use pfsense_controller::config::DaemonArgs;
use pfsense_controller::config::Settings;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
        Commands::CheckConfig(daemon_args) => run_check_config(&daemon_args),
    }
}

fn load_settings(args: &DaemonArgs) -> Result<Settings> {
    Settings::load(args).map_err(|e| anyhow::anyhow!("Invalid configuration: {e:?}"))
}

async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let settings = load_settings(&daemon_args)?;
    let _guard = logging::init(settings.log_level, daemon_args.log_file.as_deref());

    tracing::info!("Starting pfSense controller {}", &**version::VERSION);

    let app = ApplicationBuilder::new(settings).build().await?;
    app.run().await
}

fn run_check_config(daemon_args: &DaemonArgs) -> Result<()> {
    let settings = load_settings(daemon_args)?;

    println!("Configuration {} is valid", daemon_args.config.display());
    println!("  log level:      {}", settings.log_level);
    println!("  poll interval:  {}", humantime::format_duration(settings.poll_interval));
    println!(
        "  retries:        {} attempt(s), {} base delay",
        settings.retry_policy.attempts,
        humantime::format_duration(settings.retry_policy.delay)
    );
    println!("  health port:    {}", settings.health_port);
    println!("  traefik compat: {}", settings.traefik_compat_mode);
    println!("  docker host:    {}", settings.docker_host);
    for endpoint in &settings.endpoints {
        println!("  endpoint {}: {}", endpoint.name, endpoint.client.base_url);
    }
    Ok(())
}
