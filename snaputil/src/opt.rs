use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct ShowOptions {
    /// Snapshot name
    #[arg(short, long)]
    pub name: String,

    /// Retained sequence instead of the current one
    #[arg(short, long)]
    pub seq: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List stored snapshot names
    List,
    /// Print a decoded snapshot
    Show(ShowOptions),
    /// List retained sequences of a snapshot
    History {
        #[arg(short, long)]
        name: String,
    },
    /// Decode every stored snapshot and report the unreadable ones
    Verify,
    /// Hex dump of the stored bytes
    Dump {
        #[arg(short, long)]
        name: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Main command
    #[command(subcommand)]
    pub command: Commands,

    /// Snapshot directory, overrides the config file
    #[arg(short, long, value_name = "PATH")]
    pub path: Option<String>,

    /// Config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,
}
