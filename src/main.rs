use clap::Parser;
use sqlx::PgPool;
use tokio::io::BufReader;

use hh_vacancies::client::HhClient;
use hh_vacancies::config::{Command, Config};
use hh_vacancies::db::{self, Table};
use hh_vacancies::ingest;
use hh_vacancies::logging;
use hh_vacancies::queries::PgReports;
use hh_vacancies::shell::Shell;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::parse();
    logging::init(config.log_format);
    config.validate()?;

    let command = config.resolved_command();
    let clear_tables = match &command {
        Command::Clear { tables } if tables.is_empty() => Table::ALL.to_vec(),
        Command::Clear { tables } => tables
            .iter()
            .map(|name| name.parse::<Table>())
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.db()).await?;
    db::ensure_schema(&pool).await?;
    tracing::info!("Schema ready");

    match command {
        Command::Run { force } => {
            ingest_once(&config, &pool, force).await?;
            menu(&pool).await?;
        }
        Command::Ingest { force } => ingest_once(&config, &pool, force).await?,
        Command::Menu => menu(&pool).await?,
        Command::Clear { .. } => db::clear(&pool, &clear_tables).await?,
    }

    pool.close().await;
    Ok(())
}

async fn ingest_once(config: &Config, pool: &PgPool, force: bool) -> anyhow::Result<()> {
    let client = HhClient::new(&config.api())?;
    let summary = ingest::run(&client, pool, &config.ingest(force)).await?;
    if summary.already_loaded {
        println!("Data already loaded. Use --force to reload.");
    } else {
        println!(
            "Stored {} employers and {} vacancies, {} with a salary ({} records skipped)",
            summary.employers_stored, summary.vacancies_stored, summary.with_salary, summary.skipped
        );
    }
    Ok(())
}

async fn menu(pool: &PgPool) -> anyhow::Result<()> {
    let reports = PgReports::new(pool.clone());
    let stdin = BufReader::new(tokio::io::stdin());
    Shell::new(&reports, stdin, std::io::stdout()).run().await?;
    Ok(())
}
