use crate::error::AppError;
use config::{Config as Cfg, File};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Deserialize;

/// Top-level configuration for a facturacion service process.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub database: DatabaseConfig,
    pub afip: AfipConfig,
    #[serde(default)]
    pub tax: TaxConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Target environment of the tax authority web services.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AfipEnvironment {
    Homologacion,
    Produccion,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AfipConfig {
    /// Taxpayer id (CUIT) the service authenticates as.
    pub cuit: String,
    #[serde(default = "default_afip_environment")]
    pub environment: AfipEnvironment,
    /// Secret used by the development access-ticket signer.
    pub signing_secret: Secret<String>,
    /// Access-ticket lifetime requested from the authority, in hours.
    #[serde(default = "default_ticket_ttl_hours")]
    pub ticket_ttl_hours: i64,
}

impl AfipConfig {
    /// Authentication (WSAA) endpoint for the configured environment.
    pub fn wsaa_url(&self) -> &'static str {
        match self.environment {
            AfipEnvironment::Produccion => "https://wsaa.afip.gov.ar/ws/services/LoginCms",
            AfipEnvironment::Homologacion => "https://wsaahomo.afip.gov.ar/ws/services/LoginCms",
        }
    }

    /// Electronic invoicing (WSFE) endpoint for the configured environment.
    pub fn wsfe_url(&self) -> &'static str {
        match self.environment {
            AfipEnvironment::Produccion => "https://servicios1.afip.gov.ar/wsfev1/service.asmx",
            AfipEnvironment::Homologacion => "https://wswhomo.afip.gov.ar/wsfev1/service.asmx",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaxConfig {
    /// Flat VAT rate applied to every invoice line, e.g. 0.21 for 21%.
    #[serde(default = "default_tax_rate")]
    pub rate: Decimal,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            rate: default_tax_rate(),
        }
    }
}

fn default_service_name() -> String {
    "facturacion-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_afip_environment() -> AfipEnvironment {
    AfipEnvironment::Homologacion
}

fn default_ticket_ttl_hours() -> i64 {
    24
}

fn default_tax_rate() -> Decimal {
    Decimal::new(21, 2)
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_environment() {
        let cfg = AfipConfig {
            cuit: "20123456789".into(),
            environment: AfipEnvironment::Homologacion,
            signing_secret: Secret::new("dev".into()),
            ticket_ttl_hours: 24,
        };
        assert!(cfg.wsaa_url().contains("wsaahomo"));
        assert!(cfg.wsfe_url().contains("wswhomo"));

        let cfg = AfipConfig {
            environment: AfipEnvironment::Produccion,
            ..cfg
        };
        assert!(!cfg.wsaa_url().contains("homo"));
    }

    #[test]
    fn default_tax_rate_is_21_percent() {
        assert_eq!(TaxConfig::default().rate, Decimal::new(21, 2));
    }
}
