use crate::error::{ReportError, ReportResult};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of the `date` column of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Daily,
    Monthly,
}

impl Resolution {
    pub fn format(&self, date: NaiveDate) -> String {
        match self {
            Resolution::Daily => date.format("%Y-%m-%d").to_string(),
            Resolution::Monthly => date.format("%Y-%m").to_string(),
        }
    }

    /// Truncate a date or timestamp string to this resolution.
    pub fn truncate(&self, value: &str) -> ReportResult<String> {
        Ok(self.format(DateParser::parse(value)?))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Daily => f.write_str("daily"),
            Resolution::Monthly => f.write_str("monthly"),
        }
    }
}

impl FromStr for Resolution {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Resolution::Daily),
            "monthly" => Ok(Resolution::Monthly),
            _ => Err(ReportError::configuration(format!("Unknown resolution: {}", s))),
        }
    }
}

/// Parses the date and timestamp shapes found in billing rows
pub struct DateParser;

impl DateParser {
    /// Parse `YYYY-MM-DD`, `YYYY-MM` (first of month), RFC 3339 or a naive ISO 8601 timestamp.
    pub fn parse(value: &str) -> ReportResult<NaiveDate> {
        let value = value.trim();

        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(date);
        }

        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d") {
            return Ok(date);
        }

        // Handle both Z suffix and timezone info
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(dt.date_naive());
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(naive.date());
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
            return Ok(naive.date());
        }

        Err(ReportError::InvalidRow(format!("Failed to parse date: {}", value)))
    }
}

/// Move a truncated date forward by whole months, keeping its resolution.
pub fn shift_months(value: &str, months: u32, resolution: Resolution) -> ReportResult<String> {
    let date = DateParser::parse(value)?;
    let shifted = date
        .checked_add_months(Months::new(months))
        .ok_or_else(|| ReportError::InvalidRow(format!("Date out of range: {}", value)))?;
    Ok(resolution.format(shifted))
}

/// Every date bucket between `start` and `end`, inclusive, oldest first.
pub fn time_interval(start: NaiveDate, end: NaiveDate, resolution: Resolution) -> Vec<String> {
    let mut dates = Vec::new();
    let mut current = match resolution {
        Resolution::Daily => start,
        Resolution::Monthly => start.with_day(1).unwrap_or(start),
    };

    while current <= end {
        dates.push(resolution.format(current));
        let next = match resolution {
            Resolution::Daily => current.succ_opt(),
            Resolution::Monthly => current.checked_add_months(Months::new(1)),
        };
        match next {
            Some(next) => current = next,
            None => break,
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2022, 6, 1).unwrap();
        assert_eq!(DateParser::parse("2022-06-01").unwrap(), expected);
        assert_eq!(DateParser::parse("2022-06").unwrap(), expected);
        assert_eq!(DateParser::parse("2022-06-01T12:00:00Z").unwrap(), expected);
        assert_eq!(DateParser::parse("2022-06-01T12:00:00.000+02:00").unwrap(), expected);
        assert_eq!(DateParser::parse("2022-06-01T12:00:00.000").unwrap(), expected);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(DateParser::parse("cost_total").is_err());
        assert!(DateParser::parse("-cost_total").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(Resolution::Daily.truncate("2022-06-15T08:00:00Z").unwrap(), "2022-06-15");
        assert_eq!(Resolution::Monthly.truncate("2022-06-15").unwrap(), "2022-06");
    }

    #[test]
    fn test_shift_months() {
        assert_eq!(shift_months("2022-05-31", 1, Resolution::Daily).unwrap(), "2022-06-30");
        assert_eq!(shift_months("2022-12", 1, Resolution::Monthly).unwrap(), "2023-01");
    }

    #[test]
    fn test_time_interval() {
        let start = NaiveDate::from_ymd_opt(2022, 6, 29).unwrap();
        let end = NaiveDate::from_ymd_opt(2022, 7, 2).unwrap();
        assert_eq!(
            time_interval(start, end, Resolution::Daily),
            vec!["2022-06-29", "2022-06-30", "2022-07-01", "2022-07-02"]
        );
        assert_eq!(time_interval(start, end, Resolution::Monthly), vec!["2022-06", "2022-07"]);
    }
}
