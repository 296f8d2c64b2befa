//! CLI runner
//!
//! Wires the document, the real SSH adapter and the terminal prompt into the
//! registry and execution engine, and prints what happened.

use std::sync::Arc;

use tracing::info;

use super::{Cli, ReportFormat, TerminalPrompt};
use crate::config::{Document, FailurePolicy, load_document};
use crate::domain::{
    AliasDefinition, Bootstrapper, CommandOutcome, ConnectionRegistry, ExecutionEngine, RunReport,
};
use crate::error::Result;
use crate::ssh::RealSshConnector;

/// Print the alias table, one `alias = user@host` per line
pub fn print_aliases(definitions: &[AliasDefinition]) {
    for definition in definitions {
        println!("{} = {}", definition.alias, definition.target);
    }
}

/// Text rendering of one command's output, always newline-terminated
#[must_use]
pub fn render_text_report(outcome: &CommandOutcome) -> String {
    if outcome.output.is_empty() || outcome.output.ends_with('\n') {
        outcome.output.clone()
    } else {
        format!("{}\n", outcome.output)
    }
}

/// Connection table: every identifier, then the number of physical connections
#[must_use]
pub fn render_connections(identifiers: &[&str], connection_count: usize) -> String {
    let mut table = String::new();
    for identifier in identifiers {
        table.push_str(identifier);
        table.push('\n');
    }
    table.push_str(&format!("{connection_count} connection(s)\n"));
    table
}

/// Apply command-line overrides to the document settings
fn apply_overrides(cli: &Cli, document: &mut Document) {
    if cli.keep_going {
        document.settings.on_error = FailurePolicy::Continue;
    }
    if let Some(rounds) = cli.max_bootstrap_rounds {
        document.settings.retry.max_bootstrap_rounds = rounds;
    }
}

/// Load and run the document named on the command line
///
/// # Errors
///
/// Returns an error if:
/// - The document cannot be loaded or is invalid
/// - An alias host cannot be reached or bootstrapped
/// - A command fails and the failure policy is `abort`
pub async fn run_document(cli: &Cli) -> Result<RunReport> {
    let mut document = load_document(&cli.document)?;
    apply_overrides(cli, &mut document);
    let definitions = document.alias_definitions()?;

    if cli.print_aliases {
        print_aliases(&definitions);
        return Ok(RunReport::default());
    }

    info!(
        document = %cli.document.display(),
        aliases = definitions.len(),
        commands = document.exec.len(),
        "Running document"
    );

    let settings = &document.settings;
    let connector = RealSshConnector::from_settings(settings);
    let bootstrapper = Bootstrapper::from_settings(Arc::new(TerminalPrompt), settings);
    let mut registry = ConnectionRegistry::new(connector, bootstrapper);
    let engine = ExecutionEngine::from_settings(settings);
    let text = cli.report == ReportFormat::Text;

    let result = async {
        for definition in &definitions {
            registry
                .register(&definition.alias, &definition.target)
                .await?;
            if text {
                println!("Registered: {} = {}", definition.alias, definition.target);
            }
        }

        engine
            .run_with(&mut registry, &document.exec, |outcome| {
                if text {
                    print!("{}", render_text_report(outcome));
                }
            })
            .await
    }
    .await;

    if cli.show_connections {
        eprint!(
            "{}",
            render_connections(&registry.identifiers(), registry.connection_count())
        );
    }
    registry.close_all().await;
    let report = result?;

    match cli.report {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => {
            for failure in &report.failures {
                eprintln!("FAILED {}: {}: {}", failure.login, failure.command, failure.error);
            }
        }
    }

    Ok(report)
}
