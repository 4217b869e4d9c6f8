use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use xml_path_duplex::{Context, Document, Evaluator, Options, PathError};

/// Query, write or delete inside an XML document with duplex path expressions.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// JSON config file (namespaces, variables, trim_whitespace)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Namespace binding `prefix=uri` (repeatable)
    #[arg(long = "ns", global = true, value_parser = parse_pair)]
    namespaces: Vec<(String, String)>,
    /// Variable `name=value`; the value is parsed as JSON, else taken as text (repeatable)
    #[arg(long = "var", global = true, value_parser = parse_pair)]
    variables: Vec<(String, String)>,
    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the texts of every matching node as a JSON array
    Query {
        /// XML text, or @path to read it from a file
        xml: String,
        path: String,
        /// Print only the first match
        #[arg(long)]
        first: bool,
    },
    /// Create the path as needed, store VALUE there and print the document
    Write {
        /// XML text, or @path to read it from a file
        xml: String,
        path: String,
        value: String,
    },
    /// Remove every matching node and print the document
    Delete {
        /// XML text, or @path to read it from a file
        xml: String,
        path: String,
    },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{s}`"))
}

fn json_or_text(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Path(#[from] PathError),
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

fn load_xml(arg: &str) -> Result<Document, CliError> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_string(),
            source,
        })?,
        None => arg.to_string(),
    };
    Ok(Document::parse_str(&text)?)
}

fn load_options(args: &Args) -> Result<Options, CliError> {
    let mut opts = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&text)?
        }
        None => Options::default(),
    };
    // Flags win over the file.
    for (prefix, uri) in &args.namespaces {
        opts.namespaces.insert(prefix.clone(), uri.clone());
    }
    for (name, value) in &args.variables {
        opts.variables.insert(name.clone(), json_or_text(value));
    }
    Ok(opts)
}

fn run(args: Args) -> Result<(), CliError> {
    let opts = load_options(&args)?;
    let ev = Evaluator::new(Context::from_options(&opts));

    match args.command {
        Command::Query { xml, path, first } => {
            let doc = load_xml(&xml)?;
            let mut out = ev.query_text(&doc, &path)?;
            if first {
                out.truncate(1);
            }
            let json = serde_json::to_string_pretty(&out)?;
            println!("{json}");
        }
        Command::Write { xml, path, value } => {
            let mut doc = load_xml(&xml)?;
            ev.write(&mut doc, &path, &json_or_text(&value))?;
            println!("{doc}");
        }
        Command::Delete { xml, path } => {
            let mut doc = load_xml(&xml)?;
            let removed = ev.delete(&mut doc, &path)?;
            tracing::debug!(removed, "delete finished");
            println!("{doc}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
