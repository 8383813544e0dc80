//! ---
//! termup_section: "05-networking-external-interfaces"
//! termup_subsection: "binary"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Operator CLI talking to the update service."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Parser, Subcommand};
use termup_logging as logging;

mod remote;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Publish packages to and inspect a termup update service",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Upload a package and make it the current version")]
    Publish(remote::PublishArgs),
    #[command(about = "Ask the service whether a version is current")]
    Check(remote::CheckArgs),
    #[command(about = "Print the currently published manifest")]
    Manifest(remote::ServerArgs),
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Publish(args) => remote::publish(args)?,
        Commands::Check(args) => remote::check(args)?,
        Commands::Manifest(args) => remote::manifest(args)?,
    }
    Ok(())
}
