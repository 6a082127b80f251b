use std::io::Write;

use clap_complete::{
    Shell,
    generate,
};
use mk_core::errors::*;

#[derive(clap::Args)]
pub struct Args {
    #[arg(long_help = "name of the shell to generate completions for")]
    pub shell: Shell,
}

// Completions go to stdout; redirect them wherever the shell looks for them
pub(crate) fn write_completions(shell: Shell, mut cmd: clap::Command, out: &mut impl Write) -> EmptyResult {
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
    out.flush()?;
    Ok(())
}

pub fn cmd(args: &Args, cmd: clap::Command) -> EmptyResult {
    write_completions(args.shell, cmd, &mut std::io::stdout())
}
