//! Command-line interface for hgql.
//!
//! Runs operations against the "today" mock schema through the service.
//!
//! # Usage
//!
//! ```bash
//! # Run a query
//! hgql query '{ appointments { id subject } }'
//!
//! # Run one operation of a document, with variables
//! hgql query ops.graphql --operation Node --variables '{"id": "ZmFrZVRhc2tJZA=="}'
//!
//! # Parse and validate a document
//! hgql check ops.graphql
//!
//! # Complete a task and print the change notification
//! hgql watch ZmFrZVRhc2tJZA== --complete
//! ```

use clap::{Parser, Subcommand};
use colored::Colorize;
use hgql_engine::Executor;
use hgql_runtime::{Service, ServiceConfig, Subscriber};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "hgql")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker threads of the service
    #[arg(long, global = true, default_value = "1")]
    pub workers: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query or mutation against the today schema
    Query {
        /// Query text, or a path to a file holding it
        query: String,

        /// Operation to run when the document has several
        #[arg(short, long, default_value = "")]
        operation: String,

        /// Variables as a JSON object
        #[arg(long, default_value = "")]
        variables: String,

        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,
    },

    /// Parse and validate a document
    Check {
        /// Query text, or a path to a file holding it
        query: String,
    },

    /// Subscribe to changes of a node
    Watch {
        /// Encoded id of the node
        node_id: String,

        /// Complete the task to trigger a change
        #[arg(long)]
        complete: bool,
    },
}

pub async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let config = ServiceConfig::new().worker_threads(cli.workers);
    match cli.command {
        Commands::Query {
            query,
            operation,
            variables,
            pretty,
        } => {
            let source = read_query(&query)?;
            run_query(config, &source, &operation, &variables, pretty).await
        }
        Commands::Check { query } => {
            let name = if Path::new(&query).is_file() {
                query.as_str()
            } else {
                "<query>"
            };
            check(name, &read_query(&query)?, cli.verbose)
        }
        Commands::Watch { node_id, complete } => watch(config, &node_id, complete).await,
    }
}

/// Reads query text from a file when the argument names one.
fn read_query(argument: &str) -> std::io::Result<String> {
    let path = Path::new(argument);
    if path.is_file() {
        std::fs::read_to_string(path)
    } else {
        Ok(argument.to_string())
    }
}

fn started(config: ServiceConfig) -> Result<Service, Box<dyn std::error::Error>> {
    let mut service = Service::new(config);
    service.start(hgql_today::engine()?)?;
    Ok(service)
}

async fn run_query(
    config: ServiceConfig,
    query: &str,
    operation: &str,
    variables: &str,
    pretty: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let mut service = started(config)?;
    let pending = service.execute(query, operation, variables)?;

    match service.run_until(pending).await {
        Ok(result) => {
            let value: serde_json::Value = serde_json::from_str(&result)?;
            if pretty {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{result}");
            }
            Ok(i32::from(value.get("errors").is_some()))
        }
        Err(error) => {
            eprintln!("{} {}", "Error:".red().bold(), error);
            Ok(1)
        }
    }
}

fn check(name: &str, source: &str, verbose: bool) -> Result<i32, Box<dyn std::error::Error>> {
    let result = hgql_syntax::parse(source);
    if result.diagnostics.has_errors() {
        for diagnostic in result.diagnostics.errors() {
            let report = miette::Report::new(diagnostic.to_report(name, source));
            eprintln!("{report:?}");
        }
        return Ok(1);
    }

    let executor: Executor = hgql_today::executor()?;
    let errors = executor.validate(&result.document);
    if !errors.is_empty() {
        eprintln!("{} {}", "Error".red().bold(), name);
        for error in &errors {
            match error.locations.first() {
                Some(location) => eprintln!(
                    "  {} {}:{} {}",
                    "-->".blue(),
                    location.line,
                    location.column,
                    error.message
                ),
                None => eprintln!("  {} {}", "-->".blue(), error.message),
            }
        }
        return Ok(1);
    }

    if verbose {
        for operation in result.document.operations() {
            let name = operation.name.as_ref().map_or("<anonymous>", |n| n.value.as_str());
            println!("  {} {} {}", "-".dimmed(), operation.kind, name);
        }
    }
    println!("{} {}", "OK".green(), name);
    Ok(0)
}

async fn watch(
    config: ServiceConfig,
    node_id: &str,
    complete: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    let mut service = started(config)?;
    let (sender, mut payloads) = mpsc::unbounded_channel();
    let completed = Rc::new(Cell::new(false));

    let subscriber = {
        let completed = Rc::clone(&completed);
        Subscriber::new(move |payload| {
            let _ = sender.send(payload.to_string());
        })
        .on_complete(move || completed.set(true))
    };
    let variables = serde_json::json!({ "id": node_id }).to_string();
    let subscription = service.subscribe(
        "subscription Watch($id: ID!) { nodeChange(id: $id) { __typename id ... on Task { title isComplete } } }",
        "",
        &variables,
        subscriber,
    )?;
    println!("{} {}", "Subscribed".blue(), subscription);

    if complete {
        let pending = service.execute(
            "mutation Complete($id: ID!) { completeTask(input: {id: $id}) { clientMutationId } }",
            "",
            &variables,
        )?;
        let result = service.run_until(pending).await?;
        println!("{} {}", "Mutation".dimmed(), result);

        let value: serde_json::Value = serde_json::from_str(&result)?;
        if value.get("errors").is_some() {
            eprintln!("{} no change to deliver", "Error:".red().bold());
        } else if let Some(payload) = service.run_until(payloads.recv()).await {
            println!("{} {}", "Payload".green(), payload);
        }
    }

    service.unsubscribe(subscription);
    while !completed.get() {
        service.turn().await;
    }
    println!("{} {}", "Completed".blue(), subscription);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from(["hgql", "watch", "ZmFrZVRhc2tJZA==", "--complete"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Watch { ref node_id, complete: true } if node_id == "ZmFrZVRhc2tJZA=="
        ));

        let cli = Cli::try_parse_from(["hgql", "query", "{ tasks { id } }", "-o", "Tasks"]).unwrap();
        assert!(matches!(cli.command, Commands::Query { ref operation, .. } if operation == "Tasks"));
    }

    #[test]
    fn test_check_exit_codes() {
        assert_eq!(check("<query>", "{ appointments { id } }", false).unwrap(), 0);
        assert_eq!(check("<query>", "{ appointments { id }", false).unwrap(), 1);
        assert_eq!(check("<query>", "{ appointments { nope } }", false).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_exit_codes() {
        let config = ServiceConfig::new();
        assert_eq!(
            run_query(config.clone(), "{ tasks { title } }", "", "", false).await.unwrap(),
            0
        );
        assert_eq!(
            run_query(config, "{ tasks { title } }", "", "not json", false).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_watch_completes() {
        let code = watch(ServiceConfig::new(), "ZmFrZVRhc2tJZA==", true).await.unwrap();
        assert_eq!(code, 0);
    }
}
