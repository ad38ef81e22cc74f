mod config;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use api::schema::{build_schema, seed_board_demo};
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use obs::{init_tracing, ObsConfig};
use policy::PolicyMatrix;
use sea_orm::{Database, DatabaseConnection};
use tracing::info;

use crate::config::{database_url, AppConfig};
use crate::http::{AppState, ServeConfig};

#[derive(Parser, Debug)]
#[command(name = "board-server", version, about = "Campus board backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Seed demo users and posts.
    Seed,
    /// Print the GraphQL schema SDL.
    #[command(name = "schema:print")]
    SchemaPrint {
        #[arg(long, value_name = "FILE", help = "Destination file path")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(ObsConfig::default())?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Migrate(action) => match action {
            MigrateCommand::Up => migrate_up().await,
            MigrateCommand::Down => migrate_down().await,
        },
        Command::Seed => run_seed().await,
        Command::SchemaPrint { output } => schema_print(output),
    }
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    // An invalid rule table is a deploy blocker, not a per-request surprise.
    let matrix = Arc::new(PolicyMatrix::new()?);

    let config = Arc::new(AppConfig::load()?);
    let db = Arc::new(connect(&config.database_url).await?);
    ensure_migrations(db.as_ref(), cmd.allow_dirty).await?;

    let schema = build_schema(db.clone(), matrix);
    let state = AppState {
        db,
        schema,
        config,
    };
    http::serve(ServeConfig::from(&cmd), state).await
}

async fn connect(url: &str) -> Result<DatabaseConnection> {
    let db = Database::connect(url).await?;
    Ok(db)
}

async fn ensure_migrations(db: &DatabaseConnection, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(db).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `cargo run -p server -- migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn migrate_up() -> Result<()> {
    let db = connect(&database_url()).await?;
    Migrator::up(&db, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down() -> Result<()> {
    let db = connect(&database_url()).await?;
    Migrator::down(&db, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}

async fn run_seed() -> Result<()> {
    let db = connect(&database_url()).await?;
    Migrator::up(&db, None).await?;
    let records = seed_board_demo(&db).await?;
    info!(
        users = records.users.len(),
        posts = records.posts.len(),
        "demo data seeded"
    );
    Ok(())
}

fn schema_print(path: Option<PathBuf>) -> Result<()> {
    let sdl = api::schema::sdl();
    match path {
        Some(target) => {
            std::fs::write(&target, sdl)?;
            info!(path = %target.display(), "schema SDL written");
        }
        None => println!("{sdl}"),
    }
    Ok(())
}
