use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result, bail, ensure};
use chrono::Month;

use crate::cli::ExtractArgs;

pub const FIRST_MONTHLY_YEAR: i32 = 2020;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Url(String),
    Monthly {
        base_url: String,
        year: i32,
        months: (u32, u32),
    },
    Directory(PathBuf),
}

impl Target {
    pub fn from_args(args: &ExtractArgs) -> Result<Self> {
        let selected = [
            args.url.is_some(),
            args.year.is_some(),
            args.input_dir.is_some(),
        ]
        .iter()
        .filter(|selected| **selected)
        .count();
        ensure!(selected == 1, "use exactly one of --url, --year or --input-dir");

        if let Some(url) = &args.url {
            let trimmed = url.trim();
            ensure!(!trimmed.is_empty(), "--url must not be empty");
            return Ok(Self::Url(trimmed.to_string()));
        }

        if let Some(dir) = &args.input_dir {
            return Ok(Self::Directory(dir.clone()));
        }

        let year = args.year.context("no year, url or input directory provided")?;
        validate_year(year)?;
        let months = match &args.month {
            Some(raw) => parse_month_range(raw)?,
            None => (1, 12),
        };

        Ok(Self::Monthly {
            base_url: args.base_url.trim_end_matches('/').to_string(),
            year,
            months,
        })
    }

    /// Pages to scrape for PDFs, with whether every PDF on a page is wanted.
    pub fn page_urls(&self) -> Vec<(String, bool)> {
        match self {
            Self::Url(url) => vec![(url.clone(), false)],
            Self::Monthly {
                base_url,
                year,
                months,
            } => (months.0..=months.1)
                .filter_map(|month| monthly_page_url(base_url, *year, month))
                .map(|url| (url, true))
                .collect(),
            Self::Directory(_) => Vec::new(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "url:{url}"),
            Self::Monthly { year, months, .. } => {
                write!(f, "monthly:{year}:{}-{}", months.0, months.1)
            }
            Self::Directory(dir) => write!(f, "dir:{}", dir.display()),
        }
    }
}

pub fn validate_year(year: i32) -> Result<()> {
    if !(1000..=9999).contains(&year) {
        bail!("invalid year format {year}; provide a 4-digit year (YYYY)");
    }
    if year < FIRST_MONTHLY_YEAR {
        bail!("molecules of the month start at {FIRST_MONTHLY_YEAR}; got {year}");
    }
    Ok(())
}

/// Accepts a single month (`"5"`) or an ascending inclusive range (`"1-3"`).
pub fn parse_month_range(input: &str) -> Result<(u32, u32)> {
    let trimmed = input.trim();

    if let Ok(month) = trimmed.parse::<u32>() {
        ensure!(
            (1..=12).contains(&month),
            "month {month} is out of range; expected 1 to 12"
        );
        return Ok((month, month));
    }

    let invalid = || {
        format!(
            "invalid month range '{trimmed}'; enter a single month or two months separated by a dash in the range 1 to 12, the first smaller than the second"
        )
    };

    let (lower, upper) = trimmed.split_once('-').with_context(invalid)?;
    let lower = lower.trim().parse::<u32>().with_context(invalid)?;
    let upper = upper.trim().parse::<u32>().with_context(invalid)?;

    if (1..=12).contains(&lower) && (1..=12).contains(&upper) && lower < upper {
        Ok((lower, upper))
    } else {
        bail!(invalid())
    }
}

pub fn monthly_page_url(base_url: &str, year: i32, month: u32) -> Option<String> {
    let month = u8::try_from(month).ok().and_then(|m| Month::try_from(m).ok())?;
    let name = month.name().to_ascii_lowercase();
    Some(format!("{base_url}/{year}/{name}-{year}"))
}

#[cfg(test)]
mod tests {
    use super::{Target, monthly_page_url, parse_month_range, validate_year};

    #[test]
    fn parse_month_range_accepts_single_month_and_ranges() {
        assert_eq!(parse_month_range("5").unwrap(), (5, 5));
        assert_eq!(parse_month_range("1-3").unwrap(), (1, 3));
        assert_eq!(parse_month_range(" 11-12 ").unwrap(), (11, 12));
    }

    #[test]
    fn parse_month_range_rejects_malformed_input() {
        for raw in ["0", "13", "3-1", "4-4", "a-b", "1-13", "", "1-2-3"] {
            assert!(parse_month_range(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn validate_year_requires_four_digits_from_first_monthly_year() {
        assert!(validate_year(2023).is_ok());
        assert!(validate_year(2019).is_err());
        assert!(validate_year(23).is_err());
        assert!(validate_year(20231).is_err());
    }

    #[test]
    fn monthly_target_expands_to_one_page_per_month() {
        let target = Target::Monthly {
            base_url: "https://example.org/motm".to_string(),
            year: 2023,
            months: (5, 6),
        };

        let pages = target.page_urls();
        assert_eq!(
            pages,
            vec![
                ("https://example.org/motm/2023/may-2023".to_string(), true),
                ("https://example.org/motm/2023/june-2023".to_string(), true),
            ]
        );
        assert_eq!(monthly_page_url("https://x", 2023, 13), None);
    }
}
