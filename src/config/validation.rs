//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (region routes reference existing providers)
//! - Validate value ranges (delays ordered, batch size > 0, multiplier >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NavConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::config::schema::NavConfig;
use crate::provider::DataDomain;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &NavConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let retry = &config.retry;
    if retry.backoff_multiplier < 1.0 || !retry.backoff_multiplier.is_finite() {
        errors.push(ValidationError::new("retry.backoff_multiplier", "must be a finite value >= 1.0"));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        errors.push(ValidationError::new("retry.max_delay_ms", "must be >= retry.initial_delay_ms"));
    }
    if retry.timeout_ms == 0 {
        errors.push(ValidationError::new("retry.timeout_ms", "must be > 0"));
    }
    if config.health.max_delay_ms < config.health.initial_delay_ms {
        errors.push(ValidationError::new("health.max_delay_ms", "must be >= health.initial_delay_ms"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be > 0"));
    }
    for (name, o) in &config.circuit_breaker.overrides {
        if o.failure_threshold == Some(0) {
            errors.push(ValidationError::new(
                format!("circuit_breaker.overrides.{}.failure_threshold", name),
                "must be > 0",
            ));
        }
    }

    let prefetch = &config.prefetch;
    if prefetch.batch_size == 0 {
        errors.push(ValidationError::new("prefetch.batch_size", "must be > 0"));
    }
    if prefetch.average_tile_bytes == 0 {
        errors.push(ValidationError::new("prefetch.average_tile_bytes", "must be > 0"));
    }
    check_template(&mut errors, "prefetch.tile_url_template", &prefetch.tile_url_template);
    if prefetch.allowed_origin_schemes.is_empty() {
        errors.push(ValidationError::new("prefetch.allowed_origin_schemes", "must not be empty"));
    }
    for scheme in &prefetch.allowed_origin_schemes {
        if !is_scheme(scheme) {
            errors.push(ValidationError::new(
                "prefetch.allowed_origin_schemes",
                format!("'{}' is not a URL scheme", scheme),
            ));
        }
    }

    let mut names = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        if provider.timeout_ms == Some(0) {
            errors.push(ValidationError::new(format!("providers[{}].timeout_ms", i), "must be > 0"));
        }
        if provider.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("providers[{}].name", i), "must not be empty"));
        } else if !names.insert(provider.name.as_str()) {
            errors.push(ValidationError::new(
                format!("providers[{}].name", i),
                format!("duplicate provider '{}'", provider.name),
            ));
        }
        for domain in DataDomain::ALL {
            if let Some(template) = provider.template_for(domain) {
                check_template(&mut errors, &format!("providers[{}].{}", i, domain), template);
            }
        }
    }

    for (i, route) in config.regions.iter().enumerate() {
        if route.providers.is_empty() {
            errors.push(ValidationError::new(format!("regions[{}].providers", i), "must not be empty"));
        }
        for name in &route.providers {
            match config.providers.iter().find(|p| &p.name == name) {
                None => errors.push(ValidationError::new(
                    format!("regions[{}].providers", i),
                    format!("unknown provider '{}'", name),
                )),
                Some(p) if p.template_for(route.domain).is_none() => errors.push(ValidationError::new(
                    format!("regions[{}].providers", i),
                    format!("provider '{}' has no {} endpoint", name, route.domain),
                )),
                Some(_) => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn check_template(errors: &mut Vec<ValidationError>, field: &str, template: &str) {
    // Placeholders are not valid URL syntax everywhere; parse with them blanked.
    let candidate = template.replace(['{', '}'], "");
    if Url::parse(&candidate).is_err() {
        errors.push(ValidationError::new(field, format!("invalid URL template '{}'", template)));
    }
}
