use clap::Parser as _;
use genibus_pump_tools::commands;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(clap::Parser)]
#[clap(version, about, author)]
enum Commands {
    Units(commands::units::Args),
    Info(commands::info::Args),
    Decode(commands::decode::Args),
}

fn end<E: std::error::Error>(r: Result<(), E>) {
    std::process::exit(match r {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(e) = cause {
                eprintln!("  because: {e}");
                cause = e.source();
            }
            1
        }
    });
}

fn main() {
    let filter_description = std::env::var("GENIBUS_PUMP_TOOLS_LOG").unwrap_or_default();
    let filter = filter_description
        .parse::<tracing_subscriber::filter::targets::Targets>()
        .unwrap_or_default();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    match Commands::parse() {
        Commands::Units(args) => end(commands::units::run(args)),
        Commands::Info(args) => end(commands::info::run(args)),
        Commands::Decode(args) => end(commands::decode::run(args)),
    }
}
