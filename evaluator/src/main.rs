use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ctxeval::sandbox::{HostDescription, Sandbox};
use ctxeval::{DebuggerBridge, EvalRequest, EvaluatorOptions, ModuleContext, Value};

#[derive(Parser, Debug)]
#[command(
    name = "ctxeval",
    version,
    about = "Evaluates a code snippet as if it were written at a position inside a sandbox host"
)]
struct Cli {
    /// Snippet to evaluate
    snippet: String,

    /// JSON host description (types and objects)
    #[arg(long)]
    host: Option<PathBuf>,

    /// Top-level context type
    #[arg(long)]
    context: Option<String>,

    /// Immediate context type (defaults to --context)
    #[arg(long)]
    immediate: Option<String>,

    /// Byte offset of the paused position inside the context source
    #[arg(long, default_value_t = 0)]
    at: usize,

    /// Host object bound as the enclosing instance
    #[arg(long = "this")]
    this_object: Option<String>,

    /// External symbol NAME=VALUE (repeatable)
    #[arg(long = "sym", value_name = "NAME=VALUE")]
    symbols: Vec<String>,

    /// Evaluate the snippet N times
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    repeat: u32,

    /// Compile on every evaluation
    #[arg(long)]
    no_cache: bool,

    /// Maximum number of synthetic contexts walked outward
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Debug logging and compile statistics
    #[arg(long)]
    verbose: bool,
}

/// Parse `NAME=VALUE`. Values are read as int, float, bool or null where
/// possible and as a string otherwise.
fn parse_symbol(arg: &str) -> Result<(String, Value), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{arg}`"))?;
    if name.is_empty() {
        return Err(format!("missing symbol name in `{arg}`"));
    }
    let value = match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::Int(n)
            } else if let Ok(x) = raw.parse::<f64>() {
                Value::Float(x)
            } else {
                Value::from(raw)
            }
        }
    };
    Ok((name.to_string(), value))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // ── Build host ──
    let sandbox = Sandbox::new();
    let objects = match &cli.host {
        Some(path) => {
            let installed = HostDescription::load(path).and_then(|host| host.install(sandbox.types()));
            match installed {
                Ok(objects) => objects,
                Err(e) => {
                    eprintln!("ctxeval: error: {}", e);
                    std::process::exit(2);
                }
            }
        }
        None => Default::default(),
    };

    if cli.verbose {
        eprintln!(
            "ctxeval: {} types, {} objects",
            sandbox.types().len(),
            objects.len()
        );
    }

    // ── Build request ──
    let mut request = EvalRequest::new(cli.snippet.as_str());
    if let Some(context) = &cli.context {
        request = request.in_context(context.as_str(), cli.immediate.as_deref(), cli.at);
    } else if let Some(immediate) = &cli.immediate {
        request.immediate_context = Some(immediate.clone());
    }

    if let Some(id) = &cli.this_object {
        match objects.get(id) {
            Some(obj) => request = request.with_this(obj.clone()),
            None => {
                eprintln!("ctxeval: error: no object `{}` in host", id);
                std::process::exit(2);
            }
        }
    }

    for arg in &cli.symbols {
        match parse_symbol(arg) {
            Ok((name, value)) => request = request.with_symbol(&name, value),
            Err(e) => {
                eprintln!("ctxeval: error: {}", e);
                std::process::exit(2);
            }
        }
    }

    // ── Evaluate ──
    let evaluator = sandbox.evaluator_with(EvaluatorOptions {
        max_context_depth: cli.max_depth,
        cache_enabled: !cli.no_cache,
    });
    let bridge = DebuggerBridge::local_only(Arc::new(evaluator));
    let module = ModuleContext::new("ctxeval");

    let mut last = Value::Null;
    for _ in 0..cli.repeat {
        match bridge.evaluate(&module, &request) {
            Ok(value) => last = value,
            Err(e) => {
                eprintln!("ctxeval: {}", e);
                std::process::exit(1);
            }
        }
    }

    println!("{}", last);
    if cli.verbose {
        eprintln!(
            "ctxeval: {} evaluation(s), {} compile(s)",
            cli.repeat,
            sandbox.compiler().compile_count()
        );
    }
}
