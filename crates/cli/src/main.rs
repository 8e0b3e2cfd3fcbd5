use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kubetab_core::prelude::*;
use kubetab_kubehub::{ClientFactory, ConnectionConfig, QueryContext, SessionCache, TableDefinition, TableMap};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "kubetabctl", version, about = "Query Kubernetes resources as tables")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubeconfig file to use
    #[arg(long = "kubeconfig", global = true, env = "KUBETAB_KUBECONFIG")]
    config_path: Option<String>,

    /// Kubeconfig files to merge, in precedence order
    #[arg(long = "kubeconfig-paths", global = true, value_delimiter = ',')]
    config_paths: Vec<String>,

    /// Kubeconfig context (default: current-context)
    #[arg(long = "context", global = true, env = "KUBETAB_CONTEXT")]
    context: Option<String>,

    /// JSON file holding the connection settings; flags override it
    #[arg(long = "connection-file", global = true)]
    connection_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every table available on this connection (built-in and CRD)
    Tables,
    /// Show the columns of a table
    Columns {
        table: String,
    },
    /// Stream rows of a table
    List {
        table: String,
        /// Filter on metadata.name (pushed down as a field selector)
        #[arg(long = "name")]
        name: Option<String>,
        /// Filter on metadata.namespace (pushed down as a field selector)
        #[arg(long = "namespace", short = 'n')]
        namespace: Option<String>,
        /// Stop after this many rows
        #[arg(long = "limit")]
        limit: Option<u64>,
        /// Columns to print in human output
        #[arg(long = "columns", value_delimiter = ',', default_value = "namespace,name,creation_timestamp")]
        columns: Vec<String>,
    },
    /// Fetch one row by key
    Get {
        table: String,
        #[arg(long = "name")]
        name: String,
        #[arg(long = "namespace", short = 'n')]
        namespace: Option<String>,
    },
    /// List the CRDs discovered in the cluster
    Crds,
}

fn init_tracing() {
    let env = std::env::var("KUBETAB_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KUBETAB_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid KUBETAB_METRICS_ADDR; expected host:port");
        }
    }
}

fn connection_config(cli: &Cli) -> Result<ConnectionConfig> {
    let mut cfg = match &cli.connection_file {
        Some(path) => ConnectionConfig::load(path).with_context(|| format!("loading connection file {}", path))?,
        None => ConnectionConfig::default(),
    };
    if cli.config_path.is_some() {
        cfg.config_path = cli.config_path.clone();
    }
    if !cli.config_paths.is_empty() {
        cfg.config_paths = Some(cli.config_paths.clone());
    }
    if cli.context.is_some() {
        cfg.config_context = cli.context.clone();
    }
    Ok(cfg)
}

/// Cancel `token` on Ctrl-C so in-flight listings stop at the next row.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; cancelling query");
            token.cancel();
        }
    });
}

fn lookup<'a>(tables: &'a TableMap, name: &str) -> Result<&'a TableDefinition> {
    tables.get(name).ok_or_else(|| anyhow!("unknown table `{}` (see `kubetabctl tables`)", name))
}

fn cell(v: Option<&serde_json::Value>) -> String {
    match v {
        None | Some(serde_json::Value::Null) => "-".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn print_human_row(row: &Row, columns: &[String]) {
    let cells: Vec<String> = columns.iter().map(|c| format!("{:<24}", cell(row.get(c)))).collect();
    println!("{}", cells.join(" ").trim_end());
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let clients = ClientFactory::new(connection_config(&cli)?, SessionCache::new());

    match &cli.command {
        Commands::Tables => {
            let tables = kubetab_schema::table_definitions(&clients).await?;
            match cli.output {
                Output::Human => {
                    for t in tables.iter() {
                        println!("{:<48} {}", t.name, t.description);
                    }
                }
                Output::Json => {
                    let names: Vec<&str> = tables.names().collect();
                    println!("{}", serde_json::to_string_pretty(&names)?);
                }
            }
        }
        Commands::Columns { table } => {
            let tables = kubetab_schema::table_definitions(&clients).await?;
            let t = lookup(&tables, table)?;
            match cli.output {
                Output::Human => {
                    for c in &t.columns {
                        println!("{:<36} {:<10} {}", c.name, c.column_type.as_str(), c.description);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&t.columns)?),
            }
        }
        Commands::List { table, name, namespace, limit, columns } => {
            let tables = kubetab_schema::table_definitions(&clients).await?;
            let t = lookup(&tables, table)?;
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let query = QueryContext::new(KeyQuals::new(name.clone(), namespace.clone()), *limit).with_cancel(cancel);
            info!(table = %t.name, quals = ?query.quals, limit = ?limit, "list invoked");
            let outcome = match cli.output {
                Output::Human => {
                    println!("{}", columns.iter().map(|c| format!("{:<24}", c.to_uppercase())).collect::<Vec<_>>().join(" ").trim_end());
                    let mut sink = FnSink::new(*limit, |row: Row| print_human_row(&row, columns));
                    t.list(&clients, &query, &mut sink).await
                }
                Output::Json => {
                    let mut sink = VecSink::new(*limit);
                    let res = t.list(&clients, &query, &mut sink).await;
                    // Rows streamed before a failure are still printed.
                    println!("{}", serde_json::to_string_pretty(sink.rows())?);
                    res
                }
            };
            match outcome {
                Ok(o) => info!(pages = o.pages, items = o.items, stop = ?o.stop, "list finished"),
                Err(e) => {
                    error!(error = %e, table = %t.name, "list failed");
                    return Err(e.into());
                }
            }
        }
        Commands::Get { table, name, namespace } => {
            let tables = kubetab_schema::table_definitions(&clients).await?;
            let t = lookup(&tables, table)?;
            if t.get_keys().is_none() {
                return Err(anyhow!("table `{}` does not support get; use list", t.name));
            }
            let quals = KeyQuals::new(Some(name.clone()), namespace.clone());
            match t.get(&clients, &quals).await? {
                Some(row) => match cli.output {
                    Output::Human => {
                        for (k, v) in &row {
                            println!("{:<36} {}", k, cell(Some(v)));
                        }
                    }
                    Output::Json => println!("{}", serde_json::to_string_pretty(&row)?),
                },
                None => {
                    eprintln!("no row for {} {}", t.name, quals.field_selector().unwrap_or_default());
                }
            }
        }
        Commands::Crds => {
            let crds = kubetab_schema::list_crds(&clients).await?;
            match cli.output {
                Output::Human => {
                    for d in &crds {
                        let scope = if d.namespaced { "namespaced" } else { "cluster" };
                        let served = d.served_version.as_deref().unwrap_or("-");
                        println!("{} • {} • {} • served {}", d.name, d.kind, scope, served);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&crds)?),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_connection_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conn.json");
        std::fs::write(&path, r#"{"config_path":"/from/file","config_context":"file-ctx"}"#).unwrap();
        let cli = Cli::parse_from(["kubetabctl", "--connection-file", path.to_str().unwrap(), "--context", "flag-ctx", "crds"]);
        let cfg = connection_config(&cli).unwrap();
        assert_eq!(cfg.config_path.as_deref(), Some("/from/file"));
        assert_eq!(cfg.config_context.as_deref(), Some("flag-ctx"));
    }

    #[test]
    fn list_flags_parse() {
        let cli = Cli::parse_from(["kubetabctl", "-o", "json", "list", "kubernetes_pod", "-n", "kube-system", "--limit", "5"]);
        assert_eq!(cli.output, Output::Json);
        match cli.command {
            Commands::List { table, namespace, limit, columns, .. } => {
                assert_eq!(table, "kubernetes_pod");
                assert_eq!(namespace.as_deref(), Some("kube-system"));
                assert_eq!(limit, Some(5));
                assert_eq!(columns, vec!["namespace", "name", "creation_timestamp"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn cells_render_null_as_dash() {
        assert_eq!(cell(None), "-");
        assert_eq!(cell(Some(&serde_json::json!("x"))), "x");
        assert_eq!(cell(Some(&serde_json::json!(3))), "3");
    }
}
