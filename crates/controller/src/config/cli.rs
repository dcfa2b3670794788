use clap::Parser;
use clap::Subcommand;
use utils::version;

use super::daemon::DaemonArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the controller daemon
    Daemon(Box<DaemonArgs>),
    /// Load and validate the configuration, then exit
    #[command(name = "check-config")]
    CheckConfig(Box<DaemonArgs>),
}
