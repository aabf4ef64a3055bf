//! Command-line client for a running screen reader
//!
//! Usage:
//!   srctl speak "Build finished"
//!   srctl ssml --priority now --wait '<speak>Done</speak>'
//!   srctl braille "3 new messages"
//!   srctl cancel
//!   srctl pid
//!   srctl status --json

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use sr_controller::{
    ClientConfig, Controller, SecurityContext, SpeechPriority, SsmlRequest, StatusCode,
    SymbolLevel, to_status,
};

/// Control a running screen reader
#[derive(Parser)]
#[command(name = "srctl")]
#[command(version)]
#[command(about = "Send speech and braille requests to a running screen reader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Security context to act from (detected when omitted)
    #[arg(long, global = true, value_enum)]
    context: Option<ContextArg>,

    /// Override the service endpoint for the selected context
    #[arg(long, global = true)]
    endpoint: Option<PathBuf>,

    /// Reply timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Speak plain text
    Speak {
        text: String,
    },

    /// Speak SSML markup
    Ssml {
        markup: String,

        #[arg(long, default_value = "normal", value_enum)]
        priority: PriorityArg,

        #[arg(long, default_value = "unchanged", value_enum)]
        symbols: SymbolsArg,

        /// Return only after the markup was spoken
        #[arg(long)]
        wait: bool,
    },

    /// Show a message on the braille display
    Braille {
        text: String,
    },

    /// Stop speech
    Cancel,

    /// Print the service process id
    Pid,

    /// Check whether a service is reachable
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ContextArg {
    Normal,
    Secure,
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Normal,
    Next,
    Now,
}

#[derive(Clone, Copy, ValueEnum)]
enum SymbolsArg {
    None,
    Some,
    Most,
    All,
    Char,
    Unchanged,
}

impl From<ContextArg> for SecurityContext {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Normal => SecurityContext::Normal,
            ContextArg::Secure => SecurityContext::Secure,
        }
    }
}

impl From<PriorityArg> for SpeechPriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Normal => SpeechPriority::Normal,
            PriorityArg::Next => SpeechPriority::Next,
            PriorityArg::Now => SpeechPriority::Now,
        }
    }
}

impl From<SymbolsArg> for SymbolLevel {
    fn from(arg: SymbolsArg) -> Self {
        match arg {
            SymbolsArg::None => SymbolLevel::None,
            SymbolsArg::Some => SymbolLevel::Some,
            SymbolsArg::Most => SymbolLevel::Most,
            SymbolsArg::All => SymbolLevel::All,
            SymbolsArg::Char => SymbolLevel::Char,
            SymbolsArg::Unchanged => SymbolLevel::Unchanged,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = if cli.verbose {
        "sr_controller=debug,srctl=debug"
    } else {
        "sr_controller=warn,srctl=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let controller = Controller::with_config(build_config(&cli));
    let status = run(&controller, cli.command);
    if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_config(cli: &Cli) -> ClientConfig {
    let mut builder = ClientConfig::builder();
    let context = cli
        .context
        .map(SecurityContext::from)
        .unwrap_or_else(SecurityContext::detect);
    builder = builder.context(context);

    if let Some(endpoint) = &cli.endpoint {
        builder = match context {
            SecurityContext::Normal => builder.normal_endpoint(endpoint),
            SecurityContext::Secure => builder.secure_endpoint(endpoint),
        };
    }
    if let Some(ms) = cli.timeout_ms {
        builder = builder.call_timeout(Duration::from_millis(ms));
    }
    builder.build()
}

fn run(controller: &Controller, command: Commands) -> StatusCode {
    let result = match command {
        Commands::Speak { text } => controller.speak_text(&text),
        Commands::Ssml {
            markup,
            priority,
            symbols,
            wait,
        } => controller.speak_ssml(
            SsmlRequest::new(markup)
                .priority(priority.into())
                .symbol_level(symbols.into())
                .asynchronous(!wait),
        ),
        Commands::Braille { text } => controller.braille_message(&text),
        Commands::Cancel => controller.cancel_speech(),
        Commands::Pid => controller.get_process_id().map(|pid| println!("{pid}")),
        Commands::Status { json } => return status(controller, json),
    };

    if let Err(e) = &result {
        eprintln!("error: {e} [{}]", e.status());
    }
    to_status(&result)
}

fn status(controller: &Controller, json: bool) -> StatusCode {
    let result = controller.test_if_running();
    let code = to_status(&result);
    let pid = result.is_ok().then(|| controller.get_process_id().ok()).flatten();

    if json {
        let report = serde_json::json!({
            "running": code.is_success(),
            "status": code.as_u32(),
            "status_name": code.name(),
            "context": controller.config().context(),
            "pid": pid,
        });
        println!("{report}");
    } else {
        match (&result, pid) {
            (Ok(()), Some(pid)) => println!("running (pid {pid})"),
            (Ok(()), None) => println!("running"),
            (Err(e), _) => println!("not reachable: {e} [{code}]"),
        }
    }
    code
}
