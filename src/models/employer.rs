use serde_json::Value;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::models::{Fields, MappingError, nested_name, optional_str};

pub const NAME_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employer {
    pub employer_id: String,
    pub name: String,
    pub url: String,
    pub open_vacancies: i32,
    pub description: Option<String>,
    pub area: Option<String>,
}

/// Map an `employers/{id}` payload.
pub fn map_employer(raw: &Value) -> Result<Employer, MappingError> {
    let fields = Fields::new("employer", raw);

    let employer_id = fields.id(raw.get("id"), "id")?;
    let name = fields.display_name("name", NAME_MAX_CHARS)?;
    let url = fields.url("alternate_url")?;
    let open_vacancies = fields
        .amount(raw.get("open_vacancies"), "open_vacancies")?
        .unwrap_or(0);

    Ok(Employer {
        employer_id,
        name,
        url,
        open_vacancies,
        description: optional_str(raw.get("description")),
        area: nested_name(raw, "area"),
    })
}

/// Map a batch, logging and dropping the payloads that fail validation.
pub fn map_employers(raw: &[Value]) -> Vec<Employer> {
    raw.iter()
        .filter_map(|item| match map_employer(item) {
            Ok(employer) => Some(employer),
            Err(e) => {
                tracing::warn!(record = %e.record, field = e.field, "{e}");
                None
            }
        })
        .collect()
}

impl Employer {
    /// Insert or update one chunk. Returns the number of rows written.
    pub async fn write_chunk(conn: &mut PgConnection, chunk: &[Employer]) -> Result<u64, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO employers (employer_id, name, url, open_vacancies, description, area) ",
        );
        builder.push_values(chunk, |mut row, e| {
            row.push_bind(&e.employer_id)
                .push_bind(&e.name)
                .push_bind(&e.url)
                .push_bind(e.open_vacancies)
                .push_bind(&e.description)
                .push_bind(&e.area);
        });
        builder.push(
            " ON CONFLICT (employer_id) DO UPDATE SET \
             name = EXCLUDED.name, \
             url = EXCLUDED.url, \
             open_vacancies = EXCLUDED.open_vacancies, \
             description = EXCLUDED.description, \
             area = EXCLUDED.area, \
             updated_at = NOW()",
        );

        let result = builder.build().execute(conn).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::Rule;

    fn yandex() -> Value {
        json!({
            "id": "1740",
            "name": "  Яндекс ",
            "alternate_url": "https://hh.ru/employer/1740",
            "open_vacancies": 1200,
            "description": "<p>Search engine</p>",
            "area": { "id": "1", "name": "Москва" }
        })
    }

    #[test]
    fn maps_a_complete_payload() {
        let employer = map_employer(&yandex()).unwrap();
        assert_eq!(
            employer,
            Employer {
                employer_id: "1740".to_string(),
                name: "Яндекс".to_string(),
                url: "https://hh.ru/employer/1740".to_string(),
                open_vacancies: 1200,
                description: Some("<p>Search engine</p>".to_string()),
                area: Some("Москва".to_string()),
            }
        );
    }

    #[test]
    fn absent_optionals_get_defaults() {
        let raw = json!({
            "id": "3529",
            "name": "Сбер",
            "alternate_url": "https://hh.ru/employer/3529"
        });
        let employer = map_employer(&raw).unwrap();
        assert_eq!(employer.open_vacancies, 0);
        assert_eq!(employer.description, None);
        assert_eq!(employer.area, None);
    }

    #[test]
    fn missing_name_is_skipped() {
        let mut raw = yandex();
        raw.as_object_mut().unwrap().remove("name");
        let err = map_employer(&raw).unwrap_err();
        assert_eq!(err.field, "name");
        assert_eq!(err.rule, Rule::Missing);
        assert_eq!(err.record, "1740");
    }

    #[test]
    fn negative_vacancy_count_is_skipped() {
        let mut raw = yandex();
        raw["open_vacancies"] = json!(-1);
        assert_eq!(map_employer(&raw).unwrap_err().rule, Rule::Negative);
    }

    #[test]
    fn markup_in_name_is_skipped() {
        let mut raw = yandex();
        raw["name"] = json!("<script>");
        assert_eq!(
            map_employer(&raw).unwrap_err().rule,
            Rule::ForbiddenCharacter('<')
        );
    }

    #[test]
    fn batch_keeps_well_formed_siblings() {
        let batch = vec![
            json!({ "name": "No id", "alternate_url": "https://hh.ru/employer/0" }),
            yandex(),
            json!({ "id": "2180", "alternate_url": "https://hh.ru/employer/2180" }),
        ];
        let employers = map_employers(&batch);
        assert_eq!(employers.len(), 1);
        assert_eq!(employers[0].employer_id, "1740");
    }

    #[test]
    fn values_the_store_would_reject_are_caught_or_normalized() {
        let mut raw = yandex();
        raw["id"] = json!("1".repeat(25));
        assert_eq!(map_employer(&raw).unwrap_err().rule, Rule::TooLong { max: 20 });

        let mut raw = yandex();
        raw["alternate_url"] = json!("HTTPS://hh.ru/employer/1740");
        assert_eq!(map_employer(&raw).unwrap().url, "https://hh.ru/employer/1740");
    }

    #[test]
    fn mapping_is_deterministic() {
        assert_eq!(map_employer(&yandex()), map_employer(&yandex()));
    }
}
