//! Remote identity resolution
//!
//! Maps `(module, date key)` to the URL a worker fetches. The default
//! [`TemplateResolver`] fills a URL template from the [`ModuleRegistry`];
//! callers with a different naming convention plug in their own
//! [`RemoteResolver`].

use crate::identifier::{DateKey, Module};
use crate::registry::{ModuleRegistry, RegistryError};

/// Report server query template used by [`TemplateResolver::report_server`]
pub const DEFAULT_URL_TEMPLATE: &str = "{base_url}?{report_path}&nidtipoTramite={module_code}&anio={year}&EstadoTramite={variant}&rs:Format={format}";

/// Default export format requested from the report server
pub const DEFAULT_REPORT_FORMAT: &str = "CSV";

/// Maps a module and date key to a fetchable remote identity
pub trait RemoteResolver: Send + Sync {
    /// Resolve the URL for one task
    fn resolve(&self, module: &Module, date_key: &DateKey) -> Result<String, ResolveError>;
}

/// URL template resolver backed by the module registry
///
/// Supported placeholders: `{base_url}`, `{module}`, `{module_code}`,
/// `{report_path}`, `{period}`, `{year}`, `{month}`, `{day}`, `{variant}`,
/// `{date_key}` and `{format}`.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    base_url: String,
    template: String,
    format: String,
    registry: ModuleRegistry,
}

impl TemplateResolver {
    /// Resolver with a custom template
    pub fn new(
        base_url: impl Into<String>,
        template: impl Into<String>,
        registry: ModuleRegistry,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            template: template.into(),
            format: DEFAULT_REPORT_FORMAT.to_string(),
            registry,
        }
    }

    /// Resolver for the report server query convention
    pub fn report_server(base_url: impl Into<String>) -> Result<Self, ResolveError> {
        let registry = ModuleRegistry::load_embedded()?;
        Ok(Self::new(base_url, DEFAULT_URL_TEMPLATE, registry))
    }

    /// Override the requested export format
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    fn placeholder(
        &self,
        name: &str,
        module: &Module,
        date_key: &DateKey,
    ) -> Result<String, ResolveError> {
        let missing = || ResolveError::MissingComponent {
            placeholder: name.to_string(),
            date_key: date_key.to_string(),
        };
        let period = date_key.period();

        Ok(match name {
            "base_url" => self.base_url.clone(),
            "module" => module.to_string(),
            "module_code" => self.registry.get(module)?.code().to_string(),
            "report_path" => self.registry.get(module)?.report_path().to_string(),
            "period" => period.to_string(),
            "year" => period.year().to_string(),
            "month" => format!("{:02}", period.month().ok_or_else(missing)?),
            "day" => format!("{:02}", period.day().ok_or_else(missing)?),
            "variant" => date_key.variant().ok_or_else(missing)?.to_string(),
            "date_key" => date_key.to_string(),
            "format" => self.format.clone(),
            other => return Err(ResolveError::UnknownPlaceholder(other.to_string())),
        })
    }
}

impl RemoteResolver for TemplateResolver {
    fn resolve(&self, module: &Module, date_key: &DateKey) -> Result<String, ResolveError> {
        let mut url = String::with_capacity(self.template.len() + 64);
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            url.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| ResolveError::MalformedTemplate(self.template.clone()))?;
            url.push_str(&self.placeholder(&after[..close], module, date_key)?);
            rest = &after[close + 1..];
        }
        url.push_str(rest);

        Ok(url)
    }
}

/// Resolution errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// Module missing from the registry
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Template refers to an unknown placeholder
    #[error("unknown template placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    /// Template has an unclosed brace
    #[error("malformed URL template: {0}")]
    MalformedTemplate(String),

    /// Date key lacks a component the template needs
    #[error("date key {date_key} has no value for {{{placeholder}}}")]
    MissingComponent {
        /// Placeholder name
        placeholder: String,
        /// Offending date key
        date_key: String,
    },
}
