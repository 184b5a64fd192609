//! Period expansion and date key parsing through the public API

use report_downloader::identifier::{
    parse_variants, DateKey, DateRange, Granularity, IdentifierError, Module, Period,
};

#[test]
fn test_monthly_range_crosses_year_boundary() {
    let range = DateRange::from_bounds("2023-11", "2024-02", Granularity::Monthly).unwrap();
    let periods: Vec<String> = range.periods().iter().map(ToString::to_string).collect();
    assert_eq!(periods, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
}

#[test]
fn test_daily_range_covers_leap_day() {
    let range = DateRange::from_bounds("2024-02", "2024-02", Granularity::Daily).unwrap();
    let periods = range.periods();
    assert_eq!(periods.len(), 29);
    assert_eq!(periods.last().unwrap().to_string(), "2024-02-29");
}

#[test]
fn test_yearly_bounds_from_day_precision() {
    let range = DateRange::from_bounds("2021-06-15", "2023-01-01", Granularity::Yearly).unwrap();
    assert_eq!(
        range.periods(),
        vec![Period::Year(2021), Period::Year(2022), Period::Year(2023)]
    );
}

#[test]
fn test_inverted_range_rejected() {
    assert!(matches!(
        DateRange::years(2025, 2018),
        Err(IdentifierError::InvalidRange(_))
    ));
    assert!(DateRange::from_bounds("2024-13", "2024-12", Granularity::Monthly).is_err());
}

#[test]
fn test_date_key_parse_and_render() {
    let key: DateKey = "2024-03_b".parse().unwrap();
    assert_eq!(key.period(), &Period::Month { year: 2024, month: 3 });
    assert_eq!(key.variant(), Some("B"));
    assert_eq!(key.to_string(), "2024-03_B");

    let plain: DateKey = "2019".parse().unwrap();
    assert_eq!(plain.variant(), None);
    assert!("2019_".parse::<DateKey>().is_err());
}

#[test]
fn test_variant_and_module_lists() {
    assert_eq!(parse_variants("a, P,a,,b").unwrap(), vec!["A", "P", "B"]);
    assert!(parse_variants("A,P!").is_err());
    assert_eq!(
        Module::parse_list("prr, ccm ,PRR").unwrap(),
        vec![Module::Prr, Module::Ccm]
    );
    assert_eq!(
        "cobros".parse::<Module>().unwrap(),
        Module::Other("COBROS".to_string())
    );
    assert!(Module::parse_list(" , ").is_err());
}
