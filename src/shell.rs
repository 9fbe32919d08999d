//! Numbered text menu over [`Reports`].

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::AppError;
use crate::queries::{CompanyRow, Reports, SalaryAnalytics, VacancyRow};

const MENU: &str = "\
1. Companies and vacancy counts
2. All vacancies
3. Average salary
4. Vacancies above average salary
5. Search vacancies by keyword
6. Salary analytics
7. Vacancies of one company
8. Filter vacancies by salary and currency
0. Exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Companies,
    AllVacancies,
    AverageSalary,
    AboveAverage,
    KeywordSearch,
    SalaryAnalytics,
    EmployerVacancies,
    SalaryFilter,
    Exit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuChoice::Companies),
            "2" => Some(MenuChoice::AllVacancies),
            "3" => Some(MenuChoice::AverageSalary),
            "4" => Some(MenuChoice::AboveAverage),
            "5" => Some(MenuChoice::KeywordSearch),
            "6" => Some(MenuChoice::SalaryAnalytics),
            "7" => Some(MenuChoice::EmployerVacancies),
            "8" => Some(MenuChoice::SalaryFilter),
            "0" | "q" | "exit" => Some(MenuChoice::Exit),
            _ => None,
        }
    }
}

pub struct Shell<'a, R, W> {
    reports: &'a dyn Reports,
    input: R,
    output: W,
}

impl<'a, R, W> Shell<'a, R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(reports: &'a dyn Reports, input: R, output: W) -> Self {
        Self {
            reports,
            input,
            output,
        }
    }

    /// Loop until the user exits or input ends. Report failures are shown
    /// and logged; only I/O errors end the loop early.
    pub async fn run(&mut self) -> Result<(), AppError> {
        loop {
            writeln!(self.output, "\n{MENU}")?;
            let Some(line) = self.prompt("Choose an option: ").await? else {
                break;
            };

            let Some(choice) = MenuChoice::parse(&line) else {
                writeln!(self.output, "Unknown option '{}'", line.trim())?;
                continue;
            };
            if choice == MenuChoice::Exit {
                break;
            }

            if let Err(e) = self.dispatch(choice).await {
                if matches!(e, AppError::Io(_)) {
                    return Err(e);
                }
                tracing::error!(?choice, "Report failed: {e}");
                writeln!(self.output, "Error: {e}")?;
            }
        }
        self.output.flush()?;
        Ok(())
    }

    async fn dispatch(&mut self, choice: MenuChoice) -> Result<(), AppError> {
        match choice {
            MenuChoice::Companies => {
                let rows = self.reports.companies_and_vacancies_count(None).await?;
                self.print_companies(&rows)?;
            }
            MenuChoice::AllVacancies => {
                let rows = self.reports.all_vacancies().await?;
                self.print_vacancies(&rows)?;
            }
            MenuChoice::AverageSalary => match self.reports.avg_salary().await? {
                Some(avg) => writeln!(self.output, "Average salary: {avg:.2}")?,
                None => writeln!(self.output, "No vacancies with a salary")?,
            },
            MenuChoice::AboveAverage => {
                let rows = self.reports.vacancies_with_higher_salary().await?;
                self.print_vacancies(&rows)?;
            }
            MenuChoice::KeywordSearch => {
                let Some(keyword) = self.prompt("Keyword: ").await? else {
                    return Ok(());
                };
                let keyword = keyword.trim();
                if keyword.is_empty() {
                    writeln!(self.output, "Keyword must not be empty")?;
                    return Ok(());
                }
                let rows = self.reports.vacancies_with_keyword(keyword).await?;
                self.print_vacancies(&rows)?;
            }
            MenuChoice::SalaryAnalytics => {
                let analytics = self.reports.salary_analytics().await?;
                writeln!(self.output, "{}", format_analytics(&analytics))?;
            }
            MenuChoice::EmployerVacancies => {
                let Some(employer_id) = self.prompt("Employer id: ").await? else {
                    return Ok(());
                };
                let rows = self.reports.employer_vacancies(employer_id.trim()).await?;
                self.print_vacancies(&rows)?;
            }
            MenuChoice::SalaryFilter => {
                let Some(currency) = self.prompt("Currency [RUR]: ").await? else {
                    return Ok(());
                };
                let currency = match currency.trim() {
                    "" => "RUR".to_string(),
                    code => code.to_ascii_uppercase(),
                };
                let Some(min_salary) = self.prompt("Minimum salary (blank for any): ").await? else {
                    return Ok(());
                };
                let min_salary = match min_salary.trim() {
                    "" => None,
                    text => match text.parse::<i32>() {
                        Ok(value) if value >= 0 => Some(value),
                        _ => {
                            writeln!(self.output, "Minimum salary must be a non-negative number")?;
                            return Ok(());
                        }
                    },
                };
                let rows = self.reports.vacancies_by_salary(&currency, min_salary).await?;
                self.print_vacancies(&rows)?;
            }
            MenuChoice::Exit => {}
        }
        Ok(())
    }

    /// `None` at end of input.
    async fn prompt(&mut self, text: &str) -> Result<Option<String>, AppError> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    fn print_companies(&mut self, rows: &[CompanyRow]) -> Result<(), AppError> {
        if rows.is_empty() {
            writeln!(self.output, "No companies stored")?;
        }
        for row in rows {
            writeln!(self.output, "{}", format_company(row))?;
        }
        Ok(())
    }

    fn print_vacancies(&mut self, rows: &[VacancyRow]) -> Result<(), AppError> {
        if rows.is_empty() {
            writeln!(self.output, "No vacancies found")?;
        }
        for row in rows {
            writeln!(self.output, "{}", format_vacancy(row))?;
        }
        Ok(())
    }
}

pub fn format_company(row: &CompanyRow) -> String {
    format!("{} [{}]: {} vacancies", row.name, row.employer_id, row.vacancies)
}

pub fn format_vacancy(row: &VacancyRow) -> String {
    format!(
        "{} | {} | {} | {}",
        row.company,
        row.title,
        format_salary(row.salary_from, row.salary_to, &row.currency),
        row.url
    )
}

pub fn format_salary(from: Option<i32>, to: Option<i32>, currency: &str) -> String {
    match (from, to) {
        (Some(from), Some(to)) => format!("{from}-{to} {currency}"),
        (Some(from), None) => format!("from {from} {currency}"),
        (None, Some(to)) => format!("up to {to} {currency}"),
        (None, None) => "salary not specified".to_string(),
    }
}

fn format_analytics(analytics: &SalaryAnalytics) -> String {
    let figure = |value: Option<f64>| value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"));
    format!(
        "Median lower bound: {}\nMedian upper bound: {}\nMost common currency: {}",
        figure(analytics.median_from),
        figure(analytics.median_to),
        analytics.common_currency.as_deref().unwrap_or("n/a")
    )
}
