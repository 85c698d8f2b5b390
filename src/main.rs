use clap::Parser;
use stem::cli::Cli;
use stem::commands;

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = commands::run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
