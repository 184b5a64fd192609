//! Report module and date key parsing
//!
//! A download task is addressed by a [`Module`] (report category such as `CCM`)
//! and a [`DateKey`] (a period plus an optional report variant, e.g. `2024_A`).
//! Date keys double as staged file stems, so their string form is stable.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Report category grouping related downloadable reports
///
/// Known categories get their own variant; anything else registered at runtime
/// is carried as [`Module::Other`]. All names are normalized to uppercase.
///
/// # Examples
///
/// ```
/// use report_downloader::identifier::Module;
///
/// let module: Module = "ccm".parse().unwrap();
/// assert_eq!(module, Module::Ccm);
/// assert_eq!(module.to_string(), "CCM");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Module {
    /// CCM report category
    Ccm,
    /// PRR report category
    Prr,
    /// SOL report category
    Sol,
    /// Any other registered category (uppercase)
    Other(String),
}

impl Module {
    /// Canonical uppercase name
    pub fn as_str(&self) -> &str {
        match self {
            Module::Ccm => "CCM",
            Module::Prr => "PRR",
            Module::Sol => "SOL",
            Module::Other(name) => name,
        }
    }

    /// Parse a comma-separated module list (`"CCM,PRR"`)
    pub fn parse_list(s: &str) -> Result<Vec<Self>, IdentifierError> {
        let mut modules = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let module: Module = part.parse()?;
            if !modules.contains(&module) {
                modules.push(module);
            }
        }
        if modules.is_empty() {
            return Err(IdentifierError::InvalidModule(
                "module list cannot be empty".to_string(),
            ));
        }
        Ok(modules)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_uppercase();
        if name.is_empty() {
            return Err(IdentifierError::InvalidModule(
                "module name cannot be empty".to_string(),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IdentifierError::InvalidModule(format!(
                "module name '{s}' contains invalid characters"
            )));
        }

        Ok(match name.as_str() {
            "CCM" => Module::Ccm,
            "PRR" => Module::Prr,
            "SOL" => Module::Sol,
            _ => Module::Other(name),
        })
    }
}

impl TryFrom<String> for Module {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Module> for String {
    fn from(value: Module) -> Self {
        value.as_str().to_string()
    }
}

/// Calendar granularity used to expand a date range into periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One period per calendar year (`2024`)
    #[default]
    Yearly,
    /// One period per calendar month (`2024-03`)
    Monthly,
    /// One period per day (`2024-03-05`)
    Daily,
}

impl FromStr for Granularity {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yearly" | "year" | "y" => Ok(Granularity::Yearly),
            "monthly" | "month" | "m" => Ok(Granularity::Monthly),
            "daily" | "day" | "d" => Ok(Granularity::Daily),
            other => Err(IdentifierError::InvalidRange(format!(
                "unknown granularity '{other}' (expected yearly, monthly or daily)"
            ))),
        }
    }
}

/// A single reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    /// Whole year
    Year(i32),
    /// Calendar month (1-12)
    Month {
        /// Year
        year: i32,
        /// Month, 1-based
        month: u32,
    },
    /// Single day
    Day(NaiveDate),
}

impl Period {
    /// Year component
    pub fn year(&self) -> i32 {
        match self {
            Period::Year(year) => *year,
            Period::Month { year, .. } => *year,
            Period::Day(date) => date.year(),
        }
    }

    /// Month component, if the period is month or day granular
    pub fn month(&self) -> Option<u32> {
        match self {
            Period::Year(_) => None,
            Period::Month { month, .. } => Some(*month),
            Period::Day(date) => Some(date.month()),
        }
    }

    /// Day component, if the period is day granular
    pub fn day(&self) -> Option<u32> {
        match self {
            Period::Day(date) => Some(date.day()),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Year(year) => write!(f, "{year}"),
            Period::Month { year, month } => write!(f, "{year}-{month:02}"),
            Period::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl FromStr for Period {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || IdentifierError::InvalidPeriod(s.to_string());

        match s.len() {
            4 => s.parse::<i32>().map(Period::Year).map_err(|_| invalid()),
            7 => {
                let (year, month) = s.split_once('-').ok_or_else(invalid)?;
                let year: i32 = year.parse().map_err(|_| invalid())?;
                let month: u32 = month.parse().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(Period::Month { year, month })
            }
            10 => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Period::Day)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// Inclusive date range expanded into periods of a fixed granularity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Result<Self, IdentifierError> {
        if start > end {
            return Err(IdentifierError::InvalidRange(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self {
            start,
            end,
            granularity,
        })
    }

    /// Yearly range covering `first..=last`
    pub fn years(first: i32, last: i32) -> Result<Self, IdentifierError> {
        let start = NaiveDate::from_ymd_opt(first, 1, 1)
            .ok_or_else(|| IdentifierError::InvalidRange(format!("invalid year {first}")))?;
        let end = NaiveDate::from_ymd_opt(last, 12, 31)
            .ok_or_else(|| IdentifierError::InvalidRange(format!("invalid year {last}")))?;
        Self::new(start, end, Granularity::Yearly)
    }

    /// Parse range bounds given as periods (`2018`, `2024-03`, `2024-03-05`)
    ///
    /// The lower bound snaps to the start of its period and the upper bound to
    /// the end of its period.
    pub fn from_bounds(
        from: &str,
        to: &str,
        granularity: Granularity,
    ) -> Result<Self, IdentifierError> {
        let from: Period = from.parse()?;
        let to: Period = to.parse()?;
        let start = period_start(&from)?;
        let end = period_end(&to)?;
        Self::new(start, end, granularity)
    }

    /// Granularity of the expansion
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Expand the range into ordered periods
    pub fn periods(&self) -> Vec<Period> {
        let mut periods = Vec::new();
        match self.granularity {
            Granularity::Yearly => {
                for year in self.start.year()..=self.end.year() {
                    periods.push(Period::Year(year));
                }
            }
            Granularity::Monthly => {
                let (mut year, mut month) = (self.start.year(), self.start.month());
                while (year, month) <= (self.end.year(), self.end.month()) {
                    periods.push(Period::Month { year, month });
                    if month == 12 {
                        year += 1;
                        month = 1;
                    } else {
                        month += 1;
                    }
                }
            }
            Granularity::Daily => {
                let mut day = self.start;
                while day <= self.end {
                    periods.push(Period::Day(day));
                    match day.succ_opt() {
                        Some(next) => day = next,
                        None => break,
                    }
                }
            }
        }
        periods
    }
}

fn period_start(period: &Period) -> Result<NaiveDate, IdentifierError> {
    let date = match period {
        Period::Year(year) => NaiveDate::from_ymd_opt(*year, 1, 1),
        Period::Month { year, month } => NaiveDate::from_ymd_opt(*year, *month, 1),
        Period::Day(date) => Some(*date),
    };
    date.ok_or_else(|| IdentifierError::InvalidPeriod(period.to_string()))
}

fn period_end(period: &Period) -> Result<NaiveDate, IdentifierError> {
    let date = match period {
        Period::Year(year) => NaiveDate::from_ymd_opt(*year, 12, 31),
        Period::Month { year, month } => {
            let (next_year, next_month) = if *month == 12 {
                (*year + 1, 1)
            } else {
                (*year, *month + 1)
            };
            NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|d| d.pred_opt())
        }
        Period::Day(date) => Some(*date),
    };
    date.ok_or_else(|| IdentifierError::InvalidPeriod(period.to_string()))
}

/// Period plus optional report variant; renders as `2024` or `2024_A`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey {
    period: Period,
    variant: Option<String>,
}

impl DateKey {
    /// Date key without a variant
    pub fn new(period: Period) -> Self {
        Self {
            period,
            variant: None,
        }
    }

    /// Date key with a variant code such as `A`
    pub fn with_variant(period: Period, variant: &str) -> Result<Self, IdentifierError> {
        Ok(Self {
            period,
            variant: Some(validate_variant(variant)?),
        })
    }

    /// The period
    pub fn period(&self) -> &Period {
        &self.period
    }

    /// The variant code, if any
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }
}

fn validate_variant(variant: &str) -> Result<String, IdentifierError> {
    let variant = variant.trim().to_uppercase();
    if variant.is_empty() || !variant.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(IdentifierError::InvalidVariant(variant));
    }
    Ok(variant)
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}_{variant}", self.period),
            None => write!(f, "{}", self.period),
        }
    }
}

impl FromStr for DateKey {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('_') {
            Some((period, variant)) => Self::with_variant(period.parse()?, variant),
            None => Ok(Self::new(s.parse()?)),
        }
    }
}

impl TryFrom<String> for DateKey {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateKey> for String {
    fn from(value: DateKey) -> Self {
        value.to_string()
    }
}

/// Parse a comma-separated variant list (`"A,P,B"`)
pub fn parse_variants(s: &str) -> Result<Vec<String>, IdentifierError> {
    let mut variants = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let variant = validate_variant(part)?;
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    Ok(variants)
}

/// Identifier errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// Invalid module name
    #[error("invalid module: {0}")]
    InvalidModule(String),

    /// Invalid period string
    #[error("invalid period '{0}' (expected YYYY, YYYY-MM or YYYY-MM-DD)")]
    InvalidPeriod(String),

    /// Invalid variant code
    #[error("invalid variant '{0}' (expected alphanumeric code)")]
    InvalidVariant(String),

    /// Invalid date range
    #[error("invalid date range: {0}")]
    InvalidRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_parse_normalizes_case() {
        assert_eq!("prr".parse::<Module>().unwrap(), Module::Prr);
        assert_eq!(" Sol ".parse::<Module>().unwrap(), Module::Sol);
        assert_eq!(
            "ext1".parse::<Module>().unwrap(),
            Module::Other("EXT1".to_string())
        );
    }

    #[test]
    fn test_module_parse_rejects_bad_names() {
        assert!("".parse::<Module>().is_err());
        assert!("CC M".parse::<Module>().is_err());
        assert!("../CCM".parse::<Module>().is_err());
    }

    #[test]
    fn test_module_list_dedups_in_order() {
        let modules = Module::parse_list("PRR, ccm,PRR").unwrap();
        assert_eq!(modules, vec![Module::Prr, Module::Ccm]);
        assert!(Module::parse_list(" , ").is_err());
    }

    #[test]
    fn test_date_key_display_and_parse() {
        let key = DateKey::with_variant(Period::Year(2024), "a").unwrap();
        assert_eq!(key.to_string(), "2024_A");
        assert_eq!("2024_A".parse::<DateKey>().unwrap(), key);

        let monthly: DateKey = "2024-03".parse().unwrap();
        assert_eq!(
            monthly.period(),
            &Period::Month {
                year: 2024,
                month: 3
            }
        );
        assert!(monthly.variant().is_none());
    }

    #[test]
    fn test_period_parse_rejects_invalid() {
        assert!("2024-13".parse::<Period>().is_err());
        assert!("20x4".parse::<Period>().is_err());
        assert!("2024-02-30".parse::<Period>().is_err());
    }

    #[test]
    fn test_yearly_expansion() {
        let range = DateRange::years(2018, 2020).unwrap();
        assert_eq!(
            range.periods(),
            vec![Period::Year(2018), Period::Year(2019), Period::Year(2020)]
        );
    }

    #[test]
    fn test_monthly_expansion_crosses_year() {
        let range = DateRange::from_bounds("2023-11", "2024-02", Granularity::Monthly).unwrap();
        let rendered: Vec<String> = range.periods().iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn test_daily_expansion_from_month_bounds() {
        let range = DateRange::from_bounds("2024-02", "2024-02", Granularity::Daily).unwrap();
        assert_eq!(range.periods().len(), 29);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(DateRange::years(2025, 2018).is_err());
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(parse_variants("a, P,a").unwrap(), vec!["A", "P"]);
        assert!(parse_variants("A,?").is_err());
        assert!(parse_variants("").unwrap().is_empty());
    }

    #[test]
    fn test_serde_round_trip_as_strings() {
        let key: DateKey = "2019_R".parse().unwrap();
        let json = serde_json::to_string(&(Module::Ccm, key.clone())).unwrap();
        assert_eq!(json, r#"["CCM","2019_R"]"#);
        let back: (Module, DateKey) = serde_json::from_str(&json).unwrap();
        assert_eq!(back, (Module::Ccm, key));
    }
}
