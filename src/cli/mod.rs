use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::rc::Rc;

use crate::{
    config::Config,
    dispatch::Dispatcher,
    function::{Argument, Node, Payload, ValueKind},
    remote::{DefaultFetcher, Fetch, Loader},
};

#[derive(Parser, Debug)]
#[clap(version)]
struct Cli {
    /// Logs executor resolution and cache activity
    #[arg(long, global = true)]
    verbose: bool,

    /// Directory holding caches and persisted values (defaults to ~/.provfn)
    #[arg(long, global = true, value_parser)]
    home: Option<Utf8PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Loads a function from a URI, applies the arguments and prints the result
    Run(RunArgs),
    /// Prints the identifier of the applied function
    Id(ApplyArgs),
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// `[py+|ipynb+](file|http|https)://path[::member][@revision]`
    uri: String,

    /// Keyword argument as `name=value`; the value is read as JSON, or taken
    /// as a string when it isn't valid JSON
    #[arg(long = "arg", value_parser = parse_arg)]
    args: Vec<(String, Payload)>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[clap(flatten)]
    apply: ApplyArgs,

    /// Always recompute
    #[arg(long)]
    no_cache: bool,

    /// Persist the result and print where it was stored
    #[arg(long)]
    store: bool,
}

fn parse_arg(arg: &str) -> Result<(String, Payload)> {
    let Some((name, value)) = arg.split_once('=') else {
        bail!("expected name=value, got {arg}");
    };
    if name.is_empty() {
        bail!("missing argument name in {arg}");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Payload::String(value.to_string()));
    Ok((name.to_string(), value))
}

impl ApplyArgs {
    fn load(&self, config: &Config, fetcher: Rc<dyn Fetch>) -> Result<Node> {
        let function = Loader::new(config, fetcher)
            .load(&self.uri)
            .with_context(|| format!("loading {}", self.uri))?;
        let kwargs = self
            .args
            .iter()
            .map(|(name, value)| (name.clone(), Argument::Value(value.clone())));
        Ok(function.apply(vec![], kwargs)?)
    }
}

impl Cli {
    fn config(&self) -> Config {
        match &self.home {
            Some(home) => Config::with_home(home),
            None => Config::default(),
        }
    }

    fn run(self) -> Result<()> {
        let config = self.config();
        let fetcher: Rc<dyn Fetch> = Rc::new(DefaultFetcher);
        match self.command {
            Command::Run(run_args) => run_args.run(config, fetcher),
            Command::Id(apply_args) => {
                let node = apply_args.load(&config, fetcher)?;
                println!("{}", node.identifier(&config.identifier_root));
                Ok(())
            }
        }
    }
}

impl RunArgs {
    fn run(&self, config: Config, fetcher: Rc<dyn Fetch>) -> Result<()> {
        let node = self.apply.load(&config, fetcher.clone())?.cached(!self.no_cache);
        let dispatcher = Dispatcher::with_fetcher(config, fetcher);
        let requested = if self.store {
            ValueKind::RemoteValue
        } else {
            ValueKind::Value
        };
        let value = dispatcher.reduce(&node, requested)?;
        if let Some(location) = value.location() {
            eprintln!("stored at {location}");
        }
        println!("{}", serde_json::to_string_pretty(value.payload())?);
        Ok(())
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    cli.run()
}
