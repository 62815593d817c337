use anyhow::{Context, bail};
use chrono::NaiveDate;

/// Every ISO date from `from` to `to`, both inclusive
pub fn date_range(from: &str, to: &str) -> anyhow::Result<Vec<String>> {
    let start = NaiveDate::parse_from_str(from, "%Y-%m-%d")
        .with_context(|| format!("Invalid --from date '{}', expected YYYY-MM-DD", from))?;
    let end = NaiveDate::parse_from_str(to, "%Y-%m-%d")
        .with_context(|| format!("Invalid --to date '{}', expected YYYY-MM-DD", to))?;

    if end < start {
        bail!("--to {} is before --from {}", to, from);
    }

    Ok(start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| day.format("%Y-%m-%d").to_string())
        .collect())
}
