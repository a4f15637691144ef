use anyhow::Result;
use clap::{Parser, Subcommand};
use swath::db::{build, rmdb};
use swath::engine;

#[derive(Parser)]
#[command(name = "swath")]
#[command(version)]
#[command(about = "Smith-Waterman alignment of prefiltered candidate lists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align each query against its prefiltered candidate targets
    Align(engine::AlignArgs),

    /// Build an indexed sequence database from a FASTA file
    Mkdb(build::MkdbArgs),

    /// Remove a database and its auxiliary files
    Rmdb(rmdb::RmdbArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Align(args) => {
            engine::run(&args)?;
        }
        Commands::Mkdb(args) => {
            build::run(&args)?;
        }
        Commands::Rmdb(args) => {
            rmdb::run(&args)?;
        }
    }
    Ok(())
}
