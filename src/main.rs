use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use qfl::{FilterConfig, FilterParser, PlaceholderStyle, SqlCompiler};

#[derive(Parser)]
#[command(name = "qfl")]
#[command(version, about = "Render query filter values as a SQL WHERE clause", long_about = None)]
struct Cli {
    /// Path to a JSON filter config
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Use `$n` placeholders when no config is given
    #[arg(long)]
    numbered: bool,

    /// Query pairs, e.g. `salary=gt!1000.0|lt!10000.0`
    #[arg(value_parser = parse_pair, required = true)]
    pairs: Vec<(String, String)>,
}

fn parse_pair(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected `key=value`, got `{arg}`"))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_env_filter(filter)
        .init();
}

/// 每个键值对声明为字符串键，映射到同名列
fn untyped(pairs: &[(String, String)], placeholder: PlaceholderStyle) -> (FilterParser, SqlCompiler) {
    let mut parser = FilterParser::new();
    for (key, _) in pairs {
        if !parser.keys().iter().any(|(declared, _)| declared == key) {
            parser.add_string(key.clone());
        }
    }

    let columns = parser
        .keys()
        .iter()
        .map(|(key, _)| (key.clone(), key.clone()))
        .collect();
    (parser, SqlCompiler::new(placeholder).with_columns(columns))
}

fn run(cli: Cli) -> Result<()> {
    let (parser, compiler) = match &cli.config {
        Some(path) => {
            let config = FilterConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (config.parser(), config.compiler())
        }
        None => {
            let placeholder = if cli.numbered {
                PlaceholderStyle::Numbered
            } else {
                PlaceholderStyle::Positional
            };
            untyped(&cli.pairs, placeholder)
        }
    };

    let filter = parser.parse(&cli.pairs).context("parsing filter")?;
    let clause = compiler.render(&filter).context("rendering filter")?;

    println!("{}", clause.sql);
    for (i, param) in clause.params.iter().enumerate() {
        println!("  {}: {:?}", i + 1, param);
    }
    Ok(())
}

fn main() {
    init_logging();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("\nError: {e:#}\n");
        std::process::exit(1);
    }
}
