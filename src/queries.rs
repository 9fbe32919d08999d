//! Read-only reports over stored employers and vacancies.
//!
//! Every method issues a single statement. Aggregates are rounded to two
//! decimal places in SQL so every caller sees the same figure.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;

/// Salary estimate of a vacancy row aliased `v`: midpoint of both bounds,
/// else the single bound. Mirrors `Salary::estimate`.
pub const SALARY_ESTIMATE_SQL: &str = "CASE \
     WHEN v.salary_from IS NOT NULL AND v.salary_to IS NOT NULL \
     THEN (v.salary_from::numeric + v.salary_to::numeric) / 2 \
     ELSE COALESCE(v.salary_from, v.salary_to)::numeric \
     END";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CompanyRow {
    pub employer_id: String,
    pub name: String,
    pub vacancies: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VacancyRow {
    pub company: String,
    pub title: String,
    pub salary_from: Option<i32>,
    pub salary_to: Option<i32>,
    pub currency: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct SalaryAnalytics {
    pub median_from: Option<f64>,
    pub median_to: Option<f64>,
    pub common_currency: Option<String>,
}

#[async_trait]
pub trait Reports: Send + Sync {
    /// Companies with their stored vacancy counts, busiest first. Companies
    /// without vacancies are listed with zero.
    async fn companies_and_vacancies_count(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<CompanyRow>, AppError>;

    async fn all_vacancies(&self) -> Result<Vec<VacancyRow>, AppError>;

    /// Mean salary estimate over vacancies with at least one bound.
    async fn avg_salary(&self) -> Result<Option<f64>, AppError>;

    /// Vacancies whose estimate is strictly above [`Reports::avg_salary`].
    async fn vacancies_with_higher_salary(&self) -> Result<Vec<VacancyRow>, AppError>;

    /// Case-insensitive substring match on the title.
    async fn vacancies_with_keyword(&self, keyword: &str) -> Result<Vec<VacancyRow>, AppError>;

    async fn employer_vacancies(&self, employer_id: &str) -> Result<Vec<VacancyRow>, AppError>;

    /// Vacancies in `currency`, optionally only those whose lower bound (or
    /// upper bound when the lower is absent) reaches `min_salary`.
    async fn vacancies_by_salary(
        &self,
        currency: &str,
        min_salary: Option<i32>,
    ) -> Result<Vec<VacancyRow>, AppError>;

    async fn salary_analytics(&self) -> Result<SalaryAnalytics, AppError>;
}

pub struct PgReports {
    pool: PgPool,
}

impl PgReports {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const VACANCY_COLUMNS: &str = "e.name AS company, v.title, v.salary_from, v.salary_to, \
     v.currency::text AS currency, v.url";

#[async_trait]
impl Reports for PgReports {
    async fn companies_and_vacancies_count(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<CompanyRow>, AppError> {
        let rows = sqlx::query_as::<_, CompanyRow>(
            "SELECT e.employer_id::text AS employer_id, e.name::text AS name, COUNT(v.vacancy_id) AS vacancies \
             FROM employers e \
             LEFT JOIN vacancies v ON v.employer_id = e.employer_id \
             GROUP BY e.employer_id, e.name \
             ORDER BY vacancies DESC, e.name \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn all_vacancies(&self) -> Result<Vec<VacancyRow>, AppError> {
        let sql = format!(
            "SELECT {VACANCY_COLUMNS} \
             FROM vacancies v \
             JOIN employers e ON e.employer_id = v.employer_id \
             ORDER BY e.name, v.title"
        );
        let rows = sqlx::query_as::<_, VacancyRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn avg_salary(&self) -> Result<Option<f64>, AppError> {
        let sql = format!(
            "SELECT ROUND(AVG({SALARY_ESTIMATE_SQL}), 2)::float8 \
             FROM vacancies v \
             WHERE v.salary_from IS NOT NULL OR v.salary_to IS NOT NULL"
        );
        let row: (Option<f64>,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    async fn vacancies_with_higher_salary(&self) -> Result<Vec<VacancyRow>, AppError> {
        let sql = format!(
            "WITH average AS ( \
                 SELECT ROUND(AVG({SALARY_ESTIMATE_SQL}), 2) AS value \
                 FROM vacancies v \
                 WHERE v.salary_from IS NOT NULL OR v.salary_to IS NOT NULL \
             ) \
             SELECT {VACANCY_COLUMNS} \
             FROM vacancies v \
             JOIN employers e ON e.employer_id = v.employer_id \
             CROSS JOIN average a \
             WHERE ({SALARY_ESTIMATE_SQL}) > a.value \
             ORDER BY ({SALARY_ESTIMATE_SQL}) DESC, v.title"
        );
        let rows = sqlx::query_as::<_, VacancyRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn vacancies_with_keyword(&self, keyword: &str) -> Result<Vec<VacancyRow>, AppError> {
        let sql = format!(
            "SELECT {VACANCY_COLUMNS} \
             FROM vacancies v \
             JOIN employers e ON e.employer_id = v.employer_id \
             WHERE v.title ILIKE '%' || $1 || '%' ESCAPE '\\' \
             ORDER BY v.title"
        );
        let rows = sqlx::query_as::<_, VacancyRow>(&sql)
            .bind(escape_like(keyword.trim()))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn employer_vacancies(&self, employer_id: &str) -> Result<Vec<VacancyRow>, AppError> {
        let sql = format!(
            "SELECT {VACANCY_COLUMNS} \
             FROM vacancies v \
             JOIN employers e ON e.employer_id = v.employer_id \
             WHERE v.employer_id = $1 \
             ORDER BY v.published_at DESC NULLS LAST, v.title"
        );
        let rows = sqlx::query_as::<_, VacancyRow>(&sql)
            .bind(employer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn vacancies_by_salary(
        &self,
        currency: &str,
        min_salary: Option<i32>,
    ) -> Result<Vec<VacancyRow>, AppError> {
        let sql = format!(
            "SELECT {VACANCY_COLUMNS} \
             FROM vacancies v \
             JOIN employers e ON e.employer_id = v.employer_id \
             WHERE v.currency = $1 \
               AND ($2::int IS NULL OR COALESCE(v.salary_from, v.salary_to) >= $2) \
             ORDER BY COALESCE(v.salary_from, v.salary_to) DESC NULLS LAST, v.title"
        );
        let rows = sqlx::query_as::<_, VacancyRow>(&sql)
            .bind(currency.trim().to_ascii_uppercase())
            .bind(min_salary)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn salary_analytics(&self) -> Result<SalaryAnalytics, AppError> {
        let analytics = sqlx::query_as::<_, SalaryAnalytics>(
            "SELECT \
                 ROUND((PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY salary_from))::numeric, 2)::float8 AS median_from, \
                 ROUND((PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY salary_to))::numeric, 2)::float8 AS median_to, \
                 (MODE() WITHIN GROUP (ORDER BY currency))::text AS common_currency \
             FROM vacancies \
             WHERE salary_from IS NOT NULL OR salary_to IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(analytics)
    }
}

/// Escape `LIKE` wildcards so the keyword matches literally.
fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
