use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand};
use log::LevelFilter;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use bid_rca::config::AppConfig;
use bid_rca::db::{self, MemoryStore, PgStore, TableStore};
use bid_rca::filter::FilterSpec;
use bid_rca::models::Table;
use bid_rca::session::{ActiveSession, LoadState};
use bid_rca::{codec, columns, grid, report, rules};

#[derive(Parser)]
#[command(name = "bid-rca")]
#[command(about = "Root cause analysis and bid simulation over advertising bid reports", long_about = None)]
struct Cli {
    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Upload a bid report CSV and make it the active table
    Upload {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List uploaded tables
    List,
    /// Make a table the active one
    Select {
        #[arg(long)]
        id: Uuid,
    },
    /// Delete an uploaded table
    Delete {
        #[arg(long)]
        id: Uuid,
    },
    /// Replace the notes of a table
    Notes {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        text: String,
    },
    /// Write the root cause analysis report for the active table
    Rca {
        /// Analyse a CSV directly instead of the active table
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long, default_value = columns::BID_DELTA)]
        delta_column: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the drill-down link for a rule
    Link {
        #[arg(long)]
        rule: String,
    },
    /// Filter, sort and page the active table as CSV
    Grid {
        /// Analyse a CSV directly instead of the active table
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Drill-down location or query string from a report link
        #[arg(long)]
        query: Option<String>,
        /// Extra filter as `column:operator:value`
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, requires = "sort")]
        desc: bool,
        /// One-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = grid::DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
    /// Hide or show grid columns of the active table
    #[command(group(
        ArgGroup::new("change")
            .args(["hide", "show", "reset"])
            .required(true)
            .multiple(false)
    ))]
    Columns {
        #[arg(long)]
        hide: Option<String>,
        #[arg(long)]
        show: Option<String>,
        #[arg(long)]
        reset: bool,
    },
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgStore> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PgStore::new(pool, config.max_table_bytes))
}

fn table_name(csv: &Path, name: Option<String>) -> String {
    name.unwrap_or_else(|| {
        csv.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string())
    })
}

fn import(csv: &Path, name: Option<String>) -> anyhow::Result<Table> {
    let table = db::import_csv(csv, &table_name(csv, name))?;
    let missing = columns::missing_required_columns(&table.headers);
    if !missing.is_empty() {
        log::warn!("{} is missing expected columns: {}", csv.display(), missing.join(", "));
    }
    Ok(table)
}

/// The store to read from: a throwaway one seeded from `csv`, or Postgres.
async fn open_store(
    config: &AppConfig,
    csv: Option<&Path>,
) -> anyhow::Result<Box<dyn TableStore>> {
    match csv {
        Some(path) => {
            let table = import(path, None)?;
            let store = MemoryStore::with_limit(config.max_table_bytes);
            store.put_table(&table).await?;
            store.set_active_table_id(Some(table.id)).await?;
            Ok(Box::new(store))
        }
        None => Ok(Box::new(connect(config).await?)),
    }
}

async fn load_active(store: &dyn TableStore) -> anyhow::Result<Table> {
    let mut session = ActiveSession::new(store.get_active_table_id().await?);
    match session.load(store).await {
        LoadState::Ready(_) => {}
        LoadState::NoSelection => bail!("no active table; upload one or run `select`"),
        LoadState::Missing(id) => bail!("active table {id} no longer exists"),
        LoadState::Failed { message, .. } => bail!("could not load the active table: {message}"),
        LoadState::Loading(id) => bail!("table {id} is still loading"),
    }
    session.into_table().context("active table vanished")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .init();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::InitDb => {
            let store = connect(&config).await?;
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Upload { csv, name, notes } => {
            let store = connect(&config).await?;
            let mut table = import(&csv, name)?;
            table.notes = notes;
            let id = store.put_table(&table).await?;
            store.set_active_table_id(Some(id)).await?;
            println!("Uploaded {} rows from {} as {id}.", table.len(), csv.display());
        }
        Commands::List => {
            let store = connect(&config).await?;
            let active = store.get_active_table_id().await?;
            let tables = store.list_tables().await?;

            if tables.is_empty() {
                println!("No tables uploaded yet.");
                return Ok(());
            }

            for table in tables.iter() {
                let marker = if Some(table.id) == active { "*" } else { " " };
                println!(
                    "{marker} {} {} ({} rows, {} columns, uploaded {}){}",
                    table.id,
                    table.name,
                    table.row_count,
                    table.column_count,
                    table.uploaded_at.format("%Y-%m-%d %H:%M"),
                    if table.notes.is_empty() {
                        String::new()
                    } else {
                        format!(" - {}", table.notes)
                    }
                );
            }
        }
        Commands::Select { id } => {
            let store = connect(&config).await?;
            store.set_active_table_id(Some(id)).await?;
            println!("Active table is now {id}.");
        }
        Commands::Delete { id } => {
            let store = connect(&config).await?;
            store.delete_table(id).await?;
            println!("Deleted {id}.");
        }
        Commands::Notes { id, text } => {
            let store = connect(&config).await?;
            store.update_notes(id, &text).await?;
            println!("Notes updated.");
        }
        Commands::Rca {
            csv,
            delta_column,
            out,
        } => {
            let store = open_store(&config, csv.as_deref()).await?;
            let table = load_active(store.as_ref()).await?;
            let report = report::build_report(&table, &delta_column, &config.grid_path);
            match out {
                Some(out) => {
                    std::fs::write(&out, report)?;
                    println!("Report written to {}.", out.display());
                }
                None => print!("{report}"),
            }
        }
        Commands::Link { rule } => {
            let Some(rule) = rules::find(&rule) else {
                bail!("unknown rule `{rule}`");
            };
            println!("{}", codec::DrillDown::replay(rule).link(&config.grid_path));
        }
        Commands::Grid {
            csv,
            query,
            filters,
            sort,
            desc,
            page,
            page_size,
        } => {
            let store = open_store(&config, csv.as_deref()).await?;
            let table = load_active(store.as_ref()).await?;
            let settings = store.load_settings().await?;

            let mut specs: Vec<FilterSpec> = Vec::new();
            if let Some(query) = query {
                let mut location = codec::QueryLocation::parse(&query);
                if let Some(decoded) = location.take_filters() {
                    let decoded = decoded.context("could not read drill-down link")?;
                    log::info!("applying {} drill-down filters", decoded.specs.len());
                    specs.extend(decoded.specs);
                }
            }
            for filter in filters.iter() {
                specs.push(FilterSpec::parse_shorthand(filter)?);
            }

            let result = grid::query(
                &table,
                &grid::GridQuery {
                    filters: specs,
                    sort: sort.map(|column| grid::Sort {
                        column,
                        descending: desc,
                    }),
                    page: page.saturating_sub(1),
                    page_size,
                    hidden_columns: settings.hidden_for(table.id).to_vec(),
                },
            );
            result.write_csv(std::io::stdout().lock())?;
            eprintln!(
                "{} of {} rows match; page {} of {}.",
                result.matching_rows,
                result.total_rows,
                result.page + 1,
                result.page_count.max(1)
            );
        }
        Commands::Columns { hide, show, reset } => {
            let store = connect(&config).await?;
            let mut settings = store.load_settings().await?;
            let Some(id) = settings.active_table_id else {
                bail!("no active table; upload one or run `select`");
            };
            if let Some(column) = hide {
                settings.hide_column(id, &column);
            } else if let Some(column) = show {
                settings.show_column(id, &column);
            } else if reset {
                settings.hidden_columns.remove(&id);
            }
            store.save_settings(&settings).await?;
            println!("Hidden columns: {}", settings.hidden_for(id).join(", "));
        }
    }

    Ok(())
}
