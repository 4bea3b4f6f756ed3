//! evident CLI: driving adapter for the detection pipeline.
//!
//! Subcommands:
//! - `check <config>`: validate configuration and open the data file
//! - `info <config>`: print settings, required properties and scopes
//! - `eval <config> [request options]`: run one request through both passes
//!
//! Data files are read by the deterministic fixture engine, so `eval` works
//! against YAML engine descriptions.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use evident::{Dataset, HeaderList, Module, ModuleConfig, RequestContext, Settings};
use evident_http::HttpRequest;
use evident_test::{FixtureEngine, FixtureLoader};
use tracing::debug;

#[derive(Parser)]
#[command(name = "evident")]
#[command(about = "Device-detection directive pipeline", long_about = None)]
struct Cli {
    /// Enable verbose (info-level) logging to stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Enable debug-level logging to stderr.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and open its data file.
    Check(ConfigArgs),

    /// Print settings, required properties and directive scopes.
    Info(ConfigArgs),

    /// Run one request through the request and response passes.
    Eval(EvalArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Configuration file (YAML, or JSON by extension).
    config: PathBuf,

    /// Data file, overriding `file_path` from the configuration.
    #[arg(long)]
    data: Option<PathBuf>,
}

#[derive(Args)]
struct EvalArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Server name used for scope resolution.
    #[arg(long)]
    server: Option<String>,

    /// Request path, query string included.
    #[arg(long, default_value = "/")]
    path: String,

    /// Request header, as name=value. Repeatable.
    #[arg(long = "header", short = 'H', value_parser = parse_pair)]
    headers: Vec<(String, String)>,

    /// Cookie, as name=value. Repeatable.
    #[arg(long = "cookie", value_parser = parse_pair)]
    cookies: Vec<(String, String)>,

    /// Response header already set upstream, as name=value. Repeatable.
    #[arg(long = "response-header", value_parser = parse_pair)]
    response_headers: Vec<(String, String)>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    let result = match cli.command {
        Commands::Check(args) => cmd_check(&args),
        Commands::Info(args) => cmd_info(&args),
        Commands::Eval(args) => cmd_eval(&args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    debug!("Logging initialized at level: {}", level);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_check(args: &ConfigArgs) -> Result<(), String> {
    let module = load_module(&args.config)?;
    let settings = effective_settings(&module, args.data.as_deref());

    match open_dataset(&module, &settings)? {
        Some(dataset) => println!(
            "Config valid: {} directives, data file \"{}\"",
            module.directive_count(),
            dataset.path().display()
        ),
        None => println!(
            "Config valid: {} directives, no data file (detection inactive)",
            module.directive_count()
        ),
    }
    Ok(())
}

fn cmd_info(args: &ConfigArgs) -> Result<(), String> {
    let module = load_module(&args.config)?;
    let settings = effective_settings(&module, args.data.as_deref());

    println!("Settings:");
    match &settings.file_path {
        Some(path) => println!("  data file:          {}", path.display()),
        None => println!("  data file:          (none)"),
    }
    println!("  performance profile: {}", settings.performance_profile.name());
    println!("  value separator:    {:?}", settings.value_separator);

    println!("\nRequired properties:");
    println!("  {}", module.properties().joined());

    println!("\nScopes:");
    print_scope("global", module.global());
    for server in module.servers() {
        print_scope(&format!("server {}", server.name), &server.scope);
        for location in &server.locations {
            print_scope(&format!("  location {}", location.path), &location.scope);
        }
    }

    Ok(())
}

fn cmd_eval(args: &EvalArgs) -> Result<(), String> {
    let module = load_module(&args.config.config)?;
    let settings = effective_settings(&module, args.config.data.as_deref());

    let Some(dataset) = open_dataset(&module, &settings)? else {
        println!("(no data file, request passes through)");
        return Ok(());
    };

    let request = build_request(args);
    let scope = module.resolve(args.server.as_deref().or(request.host()), request.path());
    let worker = dataset.attach();

    let mut ctx = RequestContext::new();
    let pass = worker.request_pass(&mut ctx, &request, &scope);

    println!("{} {}", request.method(), args.path);
    println!("\nRequest headers:");
    for header in pass.request_headers.iter() {
        println!("  {}: {}", header.name, header.value);
    }
    for failure in &pass.failures {
        println!("  ! {} ({}): {}", failure.target, failure.mode, failure.error);
    }

    let mut headers: HeaderList = args.response_headers.iter().cloned().collect();
    let response = worker
        .response_pass(&mut ctx, &request, &scope, &mut headers)
        .map_err(|e| format!("response failed: {e}"))?;

    println!("\nResponse headers:");
    for header in headers.iter() {
        println!("  {}: {}", header.name, header.value);
    }
    for failure in &response.failures {
        println!("  ! {} ({}): {}", failure.target, failure.mode, failure.error);
    }

    if let Some(body) = response.body {
        println!("\nBody ({} {} bytes):", body.status, body.content_length);
        println!("{}", body.body);
    }

    println!("\nEngine calls: {}", dataset.engine().calls());
    Ok(())
}

fn print_scope(label: &str, scope: &evident::ScopeConfig) {
    let emit = match scope.emit_headers() {
        Some(true) => "on",
        Some(false) => "off",
        None => "inherit",
    };
    println!("  {label}: {} directives, response headers {emit}", scope.directives().len());
    for directive in scope.directives() {
        let target = directive.header_name().unwrap_or("(body)");
        let source = directive.source().map_or("", |s| s.as_str());
        println!(
            "    {} {target} [{}] {source}",
            directive.mode(),
            directive.properties().join(",")
        );
    }
    if let Some(body) = scope.body() {
        println!("    {} (body) [{}]", body.mode(), body.properties().join(","));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════════════════════════

fn load_module(path: &Path) -> Result<Module, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read \"{}\": {e}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config = if is_json {
        ModuleConfig::from_json(&content)
    } else {
        // Default to YAML (handles .yaml and .yml)
        ModuleConfig::from_yaml(&content)
    }
    .map_err(|e| format!("config invalid: {e}"))?;

    config.load().map_err(|e| format!("config invalid: {e}"))
}

fn effective_settings(module: &Module, data: Option<&Path>) -> Settings {
    let mut settings = module.settings().clone();
    if let Some(data) = data {
        settings.file_path = Some(data.to_path_buf());
    }
    settings
}

fn open_dataset(module: &Module, settings: &Settings) -> Result<Option<Arc<Dataset<FixtureEngine>>>, String> {
    Dataset::open(&FixtureLoader, settings, module.properties(), 1)
        .map_err(|e| format!("data file failed to load: {e}"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Argument parsing
// ═══════════════════════════════════════════════════════════════════════════════

fn parse_pair(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid pair \"{arg}\", expected name=value"))?;
    if key.is_empty() {
        return Err(format!("invalid pair \"{arg}\", empty name"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

fn build_request(args: &EvalArgs) -> HttpRequest {
    let mut builder = HttpRequest::builder().method("GET").path(args.path.as_str());
    for (name, value) in &args.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    for (name, value) in &args.cookies {
        builder = builder.cookie(name.as_str(), value.as_str());
    }
    builder.build()
}
