use crate::demo::{run_demo, run_slots, DemoArgs, SlotsArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use consult_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Consult Desk",
    about = "Run the consultation booking service or explore schedules from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and notification dispatcher (default command)
    Serve(ServeArgs),
    /// Print bookable slots for one staff member and date
    Slots(SlotsArgs),
    /// Walk through a Monday booking scenario end to end, including notification delivery
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Slots(args) => run_slots(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
