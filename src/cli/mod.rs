//! Command-line interface
//!
//! Loads an orchestration document and runs it against the real SSH adapter.

mod prompt;
mod runner;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

pub use prompt::TerminalPrompt;
pub use runner::{print_aliases, render_connections, render_text_report, run_document};

/// How the run report is printed on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    /// Registered aliases, then each command's output
    #[default]
    Text,
    /// The full report as JSON
    Json,
}

/// ssh-orch - Run a list of commands over SSH
#[derive(Parser, Debug)]
#[command(name = "ssh-orch")]
#[command(about = "Run a YAML list of commands over SSH, installing your public key on first contact")]
#[command(version)]
#[command(after_help = "DOCUMENT FORMAT:
    define-alias: |
        my-machine = root@blackhost.com
        friend-machine = joey@whitehost.com
    exec:
        - login: my-machine
          cmd: echo \"Hello World\"
          out: Hello World
        - login: alice@bob.com
          cmd: |
            hostname
            uname
          quiet-cmd: tar -xzf foo.tar.gz

EXAMPLES:
    # Run a document
    ssh-orch plan.yaml

    # Keep going after a failed command, print a JSON report
    ssh-orch --keep-going --report json plan.yaml

    # Show the parsed aliases without connecting
    ssh-orch --print-aliases plan.yaml

    # List the connections the run opened
    ssh-orch --show-connections plan.yaml")]
pub struct Cli {
    /// Orchestration document (YAML)
    pub document: PathBuf,

    /// Run the remaining commands after a failure instead of stopping
    #[arg(short, long)]
    pub keep_going: bool,

    /// Bootstrap rounds per host before giving up (0 = no limit)
    #[arg(long, value_name = "N")]
    pub max_bootstrap_rounds: Option<u32>,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub report: ReportFormat,

    /// Print the alias table and exit without connecting
    #[arg(long)]
    pub print_aliases: bool,

    /// Print the open connections to stderr before closing them
    #[arg(long)]
    pub show_connections: bool,
}
