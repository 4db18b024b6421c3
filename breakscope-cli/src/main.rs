use clap::Parser;

use breakscope_core::error::BreakscopeError;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "breakscope",
    version,
    about = "Predict and record which end-to-end tests a diff breaks"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    #[command(flatten)]
    global: commands::GlobalArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a stable exit code.
///
/// Exit codes:
///   0  — success
///   1  — general/unknown error
///   2  — configuration error
///   3  — invalid input (run file, missing fields, dimensionality)
///   4  — graph store error
///   6  — embedding service error
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.chain().find_map(|c| c.downcast_ref::<BreakscopeError>()) {
        return match e {
            BreakscopeError::Config(_) => 2,
            BreakscopeError::Input(_) => 3,
            BreakscopeError::Store(_) => 4,
            BreakscopeError::Embedding(_) => 6,
        };
    }

    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("config") {
        2
    } else if lower.contains("run file") {
        3
    } else if lower.contains("database") || lower.contains("graph store") {
        4
    } else if lower.contains("embedding") {
        6
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // reqwest is built without a bundled provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command, cli.global)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
