//! dbrouter command-line tool.
//!
//! Loads a topology file and shows where keys route, how statements are
//! rewritten, and how a cross-shard transaction drives its connections.
//!
//! ```bash
//! dbrouter route --config topology.toml --key user-1 --entity user
//! dbrouter rewrite --config topology.toml --key user-1 --sql "select * from user"
//! dbrouter check --config topology.toml
//! dbrouter simulate --config topology.toml --key user-1 --key user-2 \
//!     --sql "update user set age = 3" --fail
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use dbrouter_core::RoutingContext;
use dbrouter_routing::{Argument, InvokeError, OperationSpec, RoutingError, RoutingValue};
use dbrouter_server::Topology;
use dbrouter_tx::{ConnectionError, TransactionCoordinator};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Logical database and table sharding router.
#[derive(Parser, Debug)]
#[command(name = "dbrouter")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every routed command.
#[derive(ClapArgs, Debug)]
struct Target {
    /// Topology file.
    #[arg(long)]
    config: PathBuf,

    /// Entity whose routing markers apply.
    #[arg(long)]
    entity: Option<String>,

    /// Configured operation whose markers apply; overrides `--entity`.
    #[arg(long)]
    operation: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the datasource and table suffix a key routes to.
    Route {
        #[command(flatten)]
        target: Target,
        /// Routing key.
        #[arg(long)]
        key: String,
    },
    /// Print a statement rewritten for a key's table shard.
    Rewrite {
        #[command(flatten)]
        target: Target,
        /// Routing key.
        #[arg(long)]
        key: String,
        /// Statement to rewrite.
        #[arg(long)]
        sql: String,
    },
    /// Validate a topology file and list its shards.
    Check {
        /// Topology file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Run one cross-shard transaction against in-memory datasources.
    Simulate {
        #[command(flatten)]
        target: Target,
        /// Routing keys, one statement each.
        #[arg(long = "key", required = true)]
        keys: Vec<String>,
        /// Statement executed for every key.
        #[arg(long)]
        sql: String,
        /// Fail the operation after the last statement.
        #[arg(long)]
        fail: bool,
    },
}

/// Failure of a simulated operation.
#[derive(Debug, thiserror::Error)]
enum SimulateError {
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("operation failed after {0} statements")]
    Injected(usize),
}

impl From<InvokeError<ConnectionError>> for SimulateError {
    fn from(err: InvokeError<ConnectionError>) -> Self {
        match err {
            InvokeError::Routing(e) => Self::Routing(e),
            InvokeError::Operation(e) => Self::Connection(e),
        }
    }
}

/// Integer keys route as numbers, anything else as text.
fn parse_key(s: &str) -> RoutingValue {
    s.parse::<i64>()
        .map_or_else(|_| RoutingValue::from(s), RoutingValue::from)
}

fn operation(topology: &Topology, target: &Target) -> OperationSpec {
    topology.operation(target.operation.as_deref(), target.entity.as_deref())
}

fn route(topology: &Topology, target: &Target, key: &str) -> Result<(), SimulateError> {
    let op = operation(topology, target);
    let key = parse_key(key);
    let mut ctx = RoutingContext::new();
    topology
        .router()
        .route(&op, &[Argument::Key(Some(&key))], &mut ctx)?;

    let datasource = topology.datasource().determine_target(&ctx);
    let table = ctx.table_key().map_or_else(|| "-".to_string(), |t| format!("_{t}"));
    println!("{key}\t{datasource}\t{table}");
    Ok(())
}

fn rewrite(topology: &Topology, target: &Target, key: &str, sql: &str) -> Result<(), SimulateError> {
    let op = operation(topology, target);
    let key = parse_key(key);
    let mut ctx = RoutingContext::new();
    let rewritten = topology.router().invoke(
        &op,
        &[Argument::Key(Some(&key))],
        &mut ctx,
        |ctx| Ok::<_, ConnectionError>(topology.router().rewrite(sql, &op, ctx).into_owned()),
    )?;
    println!("{rewritten}");
    Ok(())
}

fn check(topology: &Topology) {
    let file = topology.file();
    let config = topology.config();
    println!(
        "{} databases x {} tables = {} shards ({} hash)",
        config.db_count(),
        config.tb_count(),
        config.total_shards(),
        config.hash().name()
    );
    for id in &file.list {
        let url = file.datasources.get(id).map_or("", |ds| ds.url.as_str());
        let marker = if file.default_datasource() == Some(id.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("datasource {id}{marker}\t{url}");
    }
    for (name, entity) in &file.entities {
        let strategy = entity.algorithm.as_deref().unwrap_or("hash");
        println!("entity {name}\tstrategy={strategy}\tsplit_table={}", entity.split_table);
    }
    for (name, op) in &file.operations {
        println!(
            "operation {name}\tkey={}\tentity={}\ttransactional={}",
            op.key,
            op.entity.as_deref().unwrap_or("-"),
            op.transactional
        );
    }
}

/// A configured operation keeps its own transactional marker; an ad hoc
/// one runs as a cross-shard transaction.
fn simulated_operation(topology: &Topology, target: &Target) -> OperationSpec {
    target
        .operation
        .as_deref()
        .and_then(|name| topology.configured_operation(name))
        .unwrap_or_else(|| operation(topology, target).transactional())
}

fn simulate(
    topology: &Topology,
    target: &Target,
    keys: &[String],
    sql: &str,
    fail: bool,
) -> Result<(), SimulateError> {
    let op = simulated_operation(topology, target);
    let router = topology.router();
    let datasource = topology.datasource();
    let mut coordinator = TransactionCoordinator::new();
    let mut ctx = RoutingContext::new();

    let result = router.in_scope(&op, &mut coordinator, |tx| {
        for key in keys {
            let key = parse_key(key);
            let args = [Argument::Key(Some(&key))];
            router.invoke_scoped(&op, &args, &mut ctx, tx, |ctx, tx| {
                let conn = datasource.acquire_connection(ctx, tx)?;
                conn.execute(&router.rewrite(sql, &op, ctx))?;
                conn.commit()?;
                conn.close()
            })?;
        }
        if fail {
            return Err(SimulateError::Injected(keys.len()));
        }
        Ok(())
    });

    for record in topology.log().records() {
        println!("{}#{}\t{:?}", record.datasource, record.connection, record.event);
    }
    result
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &args.command {
        Command::Route { target, key } => {
            let topology = Topology::from_file(&target.config)?;
            route(&topology, target, key)?;
        }
        Command::Rewrite { target, key, sql } => {
            let topology = Topology::from_file(&target.config)?;
            rewrite(&topology, target, key, sql)?;
        }
        Command::Check { config } => {
            let topology = Topology::from_file(config)?;
            check(&topology);
            info!(path = %config.display(), "topology is valid");
        }
        Command::Simulate {
            target,
            keys,
            sql,
            fail,
        } => {
            let topology = Topology::from_file(&target.config)?;
            simulate(&topology, target, keys, sql, *fail)?;
        }
    }

    Ok(())
}
