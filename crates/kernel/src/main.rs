//! Marquee Kernel
//!
//! Command line front end: create the schema, or run a filtered find or
//! count against one entity table and print the result as JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use marquee_kernel::config::Config;
use marquee_kernel::db;
use marquee_kernel::filters::{
    EntityKind, Groups, Performers, SceneMarkers, Scenes, Studios, Tags,
};
use marquee_kernel::query::{Entity, Filter, FindFilter, Repository};

#[derive(Debug, Parser)]
#[command(name = "marquee", version, about = "Query the media library")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the library tables.
    Init,
    /// Print one page of matching ids and the total.
    Find {
        entity: EntityKind,
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        direction: Option<String>,
        #[arg(long)]
        page: Option<i32>,
        #[arg(long, allow_negative_numbers = true)]
        per_page: Option<i32>,
    },
    /// Print the number of matches.
    Count {
        entity: EntityKind,
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Filter tree as JSON.
    #[arg(long)]
    filter: Option<String>,
    /// Free-text search.
    #[arg(long)]
    q: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let pool = db::create_pool(&config).await?;
    info!(url = %config.database_url, "database opened");

    match cli.command {
        Command::Init => {
            db::apply_schema(&pool).await?;
            info!("schema applied");
        }
        Command::Find {
            entity,
            query,
            sort,
            direction,
            page,
            per_page,
        } => {
            let find = FindFilter {
                q: query.q,
                sort,
                direction,
                page,
                per_page,
            };
            let output =
                dispatch(entity, &pool, &config, query.filter.as_deref(), &find, false).await?;
            println!("{output}");
        }
        Command::Count { entity, query } => {
            let find = FindFilter {
                q: query.q,
                ..FindFilter::default()
            };
            let output =
                dispatch(entity, &pool, &config, query.filter.as_deref(), &find, true).await?;
            println!("{output}");
        }
    }

    Ok(())
}

async fn dispatch(
    entity: EntityKind,
    pool: &sqlx::SqlitePool,
    config: &Config,
    filter: Option<&str>,
    find: &FindFilter,
    count_only: bool,
) -> Result<serde_json::Value> {
    match entity {
        EntityKind::Studios => run::<Studios>(pool, config, filter, find, count_only).await,
        EntityKind::Tags => run::<Tags>(pool, config, filter, find, count_only).await,
        EntityKind::Performers => run::<Performers>(pool, config, filter, find, count_only).await,
        EntityKind::Scenes => run::<Scenes>(pool, config, filter, find, count_only).await,
        EntityKind::Groups => run::<Groups>(pool, config, filter, find, count_only).await,
        EntityKind::SceneMarkers => {
            run::<SceneMarkers>(pool, config, filter, find, count_only).await
        }
    }
}

async fn run<E: Entity>(
    pool: &sqlx::SqlitePool,
    config: &Config,
    filter: Option<&str>,
    find: &FindFilter,
    count_only: bool,
) -> Result<serde_json::Value> {
    let filter: Filter<E> = match filter {
        Some(raw) => serde_json::from_str(raw).context("invalid filter JSON")?,
        None => Filter::<E>::default(),
    };
    let repository = Repository::<E>::new(pool.clone(), config.query);

    if count_only {
        let total = repository.count(&filter, find).await?;
        return Ok(json!({ "count": total }));
    }
    let result = repository.find(&filter, find).await?;
    Ok(serde_json::to_value(result)?)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
