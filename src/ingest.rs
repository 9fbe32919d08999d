//! One ingestion run: fetch employers and their vacancies, validate them
//! and upsert what survives.

use std::collections::HashSet;

use sqlx::PgPool;

use crate::client::HhClient;
use crate::config::IngestSettings;
use crate::db::{self, Table};
use crate::error::AppError;
use crate::models::{MappingRules, map_employers, map_vacancies};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub employers_fetched: usize,
    pub employers_stored: u64,
    pub vacancies_fetched: usize,
    pub vacancies_stored: u64,
    /// Stored vacancies that publish at least one salary bound.
    pub with_salary: usize,
    pub skipped: usize,
    /// True when existing data short-circuited the run.
    pub already_loaded: bool,
}

/// Fetched but not yet validated payloads.
#[derive(Debug, Default)]
pub struct Harvest {
    pub employers: Vec<serde_json::Value>,
    pub vacancies: Vec<serde_json::Value>,
}

/// Pull every configured employer and its vacancies, one request at a time.
/// Employers the API does not return are logged and left out.
pub async fn harvest(client: &HhClient, employer_ids: &[String]) -> Harvest {
    let mut harvest = Harvest::default();

    for employer_id in employer_ids {
        let Some(employer) = client.employer(employer_id).await else {
            tracing::warn!(employer_id = %employer_id, "Employer not fetched, skipping its vacancies");
            continue;
        };
        harvest.employers.push(employer);

        let vacancies = client.employer_vacancies(employer_id).await;
        tracing::info!(employer_id = %employer_id, count = vacancies.len(), "Fetched vacancies");
        harvest.vacancies.extend(vacancies);
    }

    harvest
}

/// With `force`, stored data is replaced only once something was fetched.
pub async fn run(
    client: &HhClient,
    pool: &PgPool,
    settings: &IngestSettings,
) -> Result<IngestSummary, AppError> {
    if !settings.force && db::has_data(pool).await? {
        tracing::info!("Data already loaded, use --force to reload");
        return Ok(IngestSummary {
            already_loaded: true,
            ..IngestSummary::default()
        });
    }

    let harvest = harvest(client, &settings.employer_ids).await;
    if settings.force {
        if harvest.employers.is_empty() {
            tracing::warn!("No employers fetched, keeping stored data");
            return Ok(IngestSummary::default());
        }
        db::clear(pool, &Table::ALL).await?;
    }
    store(pool, &harvest, settings).await
}

/// Map and upsert a harvest. Employers are written before vacancies so
/// every stored vacancy has its owner.
pub async fn store(
    pool: &PgPool,
    harvest: &Harvest,
    settings: &IngestSettings,
) -> Result<IngestSummary, AppError> {
    let rules = MappingRules {
        default_currency: settings.default_currency.clone(),
    };

    let employers = map_employers(&harvest.employers);
    let mapped_vacancies = map_vacancies(&harvest.vacancies, &rules);
    let mut skipped = (harvest.employers.len() - employers.len())
        + (harvest.vacancies.len() - mapped_vacancies.len());

    let known: HashSet<&str> = employers.iter().map(|e| e.employer_id.as_str()).collect();
    let (vacancies, orphans): (Vec<_>, Vec<_>) = mapped_vacancies
        .into_iter()
        .partition(|v| known.contains(v.employer_id.as_str()));
    for orphan in &orphans {
        tracing::warn!(
            record = %orphan.vacancy_id,
            employer_id = %orphan.employer_id,
            "vacancy skipped: employer was not stored"
        );
    }
    skipped += orphans.len();
    let with_salary = vacancies.iter().filter(|v| !v.salary.is_empty()).count();

    let employers_stored = db::upsert_employers(pool, &employers, settings.batch_size).await?;
    let vacancies_stored = db::upsert_vacancies(pool, &vacancies, settings.batch_size).await?;

    let summary = IngestSummary {
        employers_fetched: harvest.employers.len(),
        employers_stored,
        vacancies_fetched: harvest.vacancies.len(),
        vacancies_stored,
        with_salary,
        skipped,
        already_loaded: false,
    };
    tracing::info!(
        employers = summary.employers_stored,
        vacancies = summary.vacancies_stored,
        with_salary = summary.with_salary,
        skipped = summary.skipped,
        "Ingestion complete"
    );
    Ok(summary)
}
