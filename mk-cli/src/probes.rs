use mk_core::prelude::*;

#[derive(clap::Args)]
pub struct Args {
    #[arg(short, long, long_help = "manager config file; the built-in resources are used if unset")]
    pub config: Option<String>,

    #[arg(short, long, long_help = "namespace the probes are scoped to", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

pub fn cmd(args: &Args) -> EmptyResult {
    let config = crate::load_config(args.config.as_deref())?;
    print!("{}", render(&config, &args.namespace)?);
    Ok(())
}

pub(crate) fn render(config: &mk_contexts::ManagerConfig, namespace: &str) -> anyhow::Result<String> {
    let groups = config.factory_handler()?.get_permissions_requests(namespace);
    Ok(serde_yaml::to_string(&groups)?)
}
