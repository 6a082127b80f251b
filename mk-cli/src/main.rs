#![cfg_attr(coverage, feature(coverage_attribute))]
mod completions;
mod probes;
mod watch;

use clap::{
    CommandFactory,
    Parser,
    Subcommand,
    crate_version,
};
use mk_contexts::ManagerConfig;
use mk_core::logging;
use mk_core::prelude::*;

#[derive(Parser)]
#[command(
    about = "command-line app for tracking every context in a kubeconfig with Multikube",
    version,
    propagate_version = true
)]
struct MkCommandRoot {
    #[command(subcommand)]
    subcommand: MkSubcommand,

    #[arg(short, long, default_value = "warn")]
    verbosity: String,
}

#[derive(Subcommand)]
enum MkSubcommand {
    #[command(about = "generate shell completions for mkctl")]
    Completions(completions::Args),

    #[command(about = "print the permission probe groups for a namespace", visible_alias = "p")]
    Probes(probes::Args),

    #[command(about = "multikube version")]
    Version,

    #[command(about = "watch every context in the local kubeconfig", visible_alias = "w")]
    Watch(watch::Args),
}

// No file means the built-in defaults and resource list
pub(crate) fn load_config(filename: Option<&str>) -> anyhow::Result<ManagerConfig> {
    match filename {
        Some(f) => ManagerConfig::load(f),
        None => Ok(ManagerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> EmptyResult {
    let args = MkCommandRoot::parse();

    // watch runs until interrupted, so it gets the long-running log format
    match &args.subcommand {
        MkSubcommand::Watch(_) => logging::setup(&args.verbosity),
        _ => logging::setup_for_cli(&args.verbosity),
    }

    match &args.subcommand {
        MkSubcommand::Completions(args) => completions::cmd(args, MkCommandRoot::command()),
        MkSubcommand::Probes(args) => probes::cmd(args),
        MkSubcommand::Version => {
            println!("mkctl {}", crate_version!());
            Ok(())
        },
        MkSubcommand::Watch(args) => watch::cmd(args).await,
    }
}

#[cfg(test)]
mod tests;
