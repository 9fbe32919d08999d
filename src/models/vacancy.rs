use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::models::{Fields, MappingError, Rule, nested_name, present};

pub const TITLE_MAX_CHARS: usize = 200;

/// Salary bounds as published; either side may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Salary {
    pub from: Option<i32>,
    pub to: Option<i32>,
}

impl Salary {
    /// Single figure used by averages: the midpoint when both bounds are
    /// known, otherwise whichever bound is present.
    ///
    /// Must stay in line with `SALARY_ESTIMATE_SQL` in `queries`.
    pub fn estimate(&self) -> Option<f64> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some((f64::from(from) + f64::from(to)) / 2.0),
            (Some(bound), None) | (None, Some(bound)) => Some(f64::from(bound)),
            (None, None) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vacancy {
    pub vacancy_id: String,
    pub employer_id: String,
    pub title: String,
    pub salary: Salary,
    pub currency: String,
    pub url: String,
    pub experience: Option<String>,
    pub schedule: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Settings the vacancy mapper needs beyond the payload itself.
#[derive(Debug, Clone)]
pub struct MappingRules {
    pub default_currency: String,
}

impl Default for MappingRules {
    fn default() -> Self {
        Self {
            default_currency: "RUR".to_string(),
        }
    }
}

/// Map one item of a `vacancies` page.
///
/// A vacancy whose lower salary bound exceeds the upper one is rejected
/// here; the store carries the same check as a constraint.
pub fn map_vacancy(raw: &Value, rules: &MappingRules) -> Result<Vacancy, MappingError> {
    let fields = Fields::new("vacancy", raw);

    let vacancy_id = fields.id(raw.get("id"), "id")?;
    let title = fields.text("name", TITLE_MAX_CHARS)?;
    let employer_id = fields.id(raw.get("employer").and_then(|e| e.get("id")), "employer.id")?;
    let url = fields.url("alternate_url")?;

    let salary_raw = present(raw.get("salary"));
    if salary_raw.is_some_and(|s| !s.is_object()) {
        return Err(fields.fail("salary", Rule::WrongType));
    }
    let salary = Salary {
        from: fields.amount(salary_raw.and_then(|s| s.get("from")), "salary.from")?,
        to: fields.amount(salary_raw.and_then(|s| s.get("to")), "salary.to")?,
    };
    if let (Some(from), Some(to)) = (salary.from, salary.to)
        && from > to
    {
        return Err(fields.fail("salary", Rule::InvertedRange));
    }

    let currency = match present(salary_raw.and_then(|s| s.get("currency"))) {
        None => rules.default_currency.clone(),
        Some(Value::String(code)) => {
            let code = code.trim().to_ascii_uppercase();
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(fields.fail("salary.currency", Rule::InvalidCurrency));
            }
            code
        }
        Some(_) => return Err(fields.fail("salary.currency", Rule::WrongType)),
    };

    Ok(Vacancy {
        vacancy_id,
        employer_id,
        title,
        salary,
        currency,
        url,
        experience: nested_name(raw, "experience"),
        schedule: nested_name(raw, "schedule"),
        published_at: present(raw.get("published_at"))
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
    })
}

/// Map a batch, logging and dropping the payloads that fail validation.
pub fn map_vacancies(raw: &[Value], rules: &MappingRules) -> Vec<Vacancy> {
    raw.iter()
        .filter_map(|item| match map_vacancy(item, rules) {
            Ok(vacancy) => Some(vacancy),
            Err(e) => {
                tracing::warn!(record = %e.record, field = e.field, "{e}");
                None
            }
        })
        .collect()
}

/// hh.ru sends `2024-01-15T10:00:00+0300`, which is not strict RFC 3339.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

impl Vacancy {
    /// Insert or update one chunk. Returns the number of rows written.
    pub async fn write_chunk(conn: &mut PgConnection, chunk: &[Vacancy]) -> Result<u64, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO vacancies (vacancy_id, employer_id, title, salary_from, salary_to, currency, url, experience, schedule, published_at) ",
        );
        builder.push_values(chunk, |mut row, v| {
            row.push_bind(&v.vacancy_id)
                .push_bind(&v.employer_id)
                .push_bind(&v.title)
                .push_bind(v.salary.from)
                .push_bind(v.salary.to)
                .push_bind(&v.currency)
                .push_bind(&v.url)
                .push_bind(&v.experience)
                .push_bind(&v.schedule)
                .push_bind(v.published_at);
        });
        builder.push(
            " ON CONFLICT (vacancy_id) DO UPDATE SET \
             employer_id = EXCLUDED.employer_id, \
             title = EXCLUDED.title, \
             salary_from = EXCLUDED.salary_from, \
             salary_to = EXCLUDED.salary_to, \
             currency = EXCLUDED.currency, \
             url = EXCLUDED.url, \
             experience = EXCLUDED.experience, \
             schedule = EXCLUDED.schedule, \
             published_at = EXCLUDED.published_at, \
             updated_at = NOW()",
        );

        let result = builder.build().execute(conn).await?;
        Ok(result.rows_affected())
    }
}
