//! Registry contents and URL resolution

use report_downloader::identifier::{DateKey, Module, Period};
use report_downloader::registry::ModuleRegistry;
use report_downloader::resolver::{RemoteResolver, TemplateResolver};

#[test]
fn test_embedded_registry_defaults() {
    let registry = ModuleRegistry::load_embedded().unwrap();
    assert_eq!(registry.entries().count(), 3);
    assert_eq!(registry.default_years(), (2018, 2025));
    assert_eq!(registry.get(&Module::Prr).unwrap().code(), 57);
    assert!(registry.get(&Module::Other("XYZ".into())).is_err());
}

#[test]
fn test_resolved_url_carries_code_year_and_variant() {
    let resolver = TemplateResolver::report_server("http://reports.local/ReportServer").unwrap();
    let key = DateKey::with_variant(Period::Year(2022), "E").unwrap();
    let url = resolver.resolve(&Module::Ccm, &key).unwrap();

    assert!(url.starts_with("http://reports.local/ReportServer?"));
    assert!(url.contains("nidtipoTramite=58"));
    assert!(url.contains("anio=2022"));
    assert!(url.contains("EstadoTramite=E"));
    assert!(url.ends_with("rs:Format=CSV"));
}

#[test]
fn test_default_template_requires_variant() {
    let resolver = TemplateResolver::report_server("http://reports.local/ReportServer").unwrap();
    let key = DateKey::new(Period::Year(2022));
    assert!(resolver.resolve(&Module::Sol, &key).is_err());
}
