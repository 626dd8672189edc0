use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

mod cli;
mod config;
mod extract;
mod graph;
mod parser;
mod pipeline;
mod query;
mod store;

#[derive(Parser)]
#[command(name = "codeatlas")]
#[command(author = "Atlas Project Team")]
#[command(version = "0.1.0")]
#[command(about = "Local code-intelligence engine: symbol indexing, dependency graphs and full-text code search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a repository (single-shot run)
    Index {
        /// Project directory to index
        #[arg(default_value = ".")]
        project: String,

        /// Repository id (defaults to the project directory name)
        #[arg(short, long)]
        repository: Option<String>,

        /// Git ref being indexed
        #[arg(long = "ref", default_value = "HEAD")]
        git_ref: String,

        /// Commit sha being indexed
        #[arg(long)]
        commit: Option<String>,

        /// Files per storage transaction
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Run the background job queue until interrupted
    Queue {
        /// Project directory to serve
        #[arg(default_value = ".")]
        project: String,

        /// Repository id (defaults to the project directory name)
        #[arg(short, long)]
        repository: Option<String>,
    },

    /// Full-text search over indexed file content
    Search {
        /// Search term
        term: String,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Restrict to one repository
        #[arg(short, long)]
        repository: Option<String>,

        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show file dependencies
    Deps {
        /// File path, as indexed
        file: String,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Repository id
        #[arg(short, long)]
        repository: Option<String>,

        /// Traversal direction: dependencies, dependents or both
        #[arg(long, default_value = "dependencies")]
        direction: String,

        /// Traversal depth
        #[arg(long)]
        depth: Option<usize>,

        /// Include circular dependency chains
        #[arg(long)]
        cycles: bool,
    },

    /// Report circular dependencies
    Cycles {
        /// Project directory
        #[arg(default_value = ".")]
        project: String,

        /// Repository id
        #[arg(short, long)]
        repository: Option<String>,
    },

    /// Show the status of an index job
    Job {
        /// Job id
        job_id: i64,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show index statistics
    Stats {
        /// Project directory
        #[arg(default_value = ".")]
        project: String,

        /// Include recently indexed files
        #[arg(long)]
        verbose: bool,
    },
}

fn init_logging(debug: bool, verbose: bool) {
    let level = if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.verbose);

    info!("codeatlas v0.1.0 starting...");

    match cli.command {
        Commands::Index {
            project,
            repository,
            git_ref,
            commit,
            chunk_size,
        } => {
            cli::index::index_project(project, repository, git_ref, commit, chunk_size).await?;
        }

        Commands::Queue {
            project,
            repository,
        } => {
            cli::queue::run_queue(project, repository).await?;
        }

        Commands::Search {
            term,
            project,
            repository,
            limit,
        } => {
            cli::search::search_index(term, project, repository, limit).await?;
        }

        Commands::Deps {
            file,
            project,
            repository,
            direction,
            depth,
            cycles,
        } => {
            cli::deps::show_dependencies(file, project, repository, direction, depth, cycles)
                .await?;
        }

        Commands::Cycles {
            project,
            repository,
        } => {
            cli::cycles::show_cycles(project, repository).await?;
        }

        Commands::Job { job_id, project } => {
            cli::jobs::show_job(job_id, project).await?;
        }

        Commands::Stats { project, verbose } => {
            cli::stats::show_stats(project, verbose).await?;
        }
    }

    Ok(())
}
