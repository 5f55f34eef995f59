use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pitch-connect")]
#[command(about = "Share your portfolio with a spoken pitch and a one-click LinkedIn connect")]
#[command(version)]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a pitch and print a share link for it
    Share(PackageArgs),

    /// Validate a pitch without sharing it
    Check(PackageArgs),

    /// Open a share link: show the portfolio and narrate the pitch
    View {
        /// Share link, or just its query string
        link: String,
    },
}

#[derive(clap::Args, Debug)]
pub struct PackageArgs {
    /// Portfolio website URL
    #[arg(short, long)]
    pub portfolio: String,

    /// LinkedIn profile URL
    #[arg(short, long)]
    pub linkedin: String,

    /// Pitch to narrate to viewers
    #[arg(long)]
    pub pitch: String,
}
