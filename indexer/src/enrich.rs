//! City enrichment over the restcountries capital-city API.
//!
//! Lookups happen at most once per distinct city name during a build.
//! Any network, status, or shape problem degrades to `None`; a build
//! never fails because an enrichment endpoint is down.

use std::time::Duration;

use gazette_core::classify::format_magnitude;
use gazette_core::index::{CityEnrich, CityMetadata};
use serde::Deserialize;

const BASE_URL: &str = "https://restcountries.com/v3.1/capital";

#[derive(Deserialize)]
struct CountryInfo {
    name: CountryName,
    #[serde(default)]
    currencies: std::collections::HashMap<String, serde_json::Value>,
    #[serde(default)]
    population: u64,
}

#[derive(Deserialize)]
struct CountryName {
    common: String,
}

/// Blocking restcountries client.
pub struct RestCountries {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl RestCountries {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, base_url: base_url.to_string() })
    }

    fn fetch(&self, city: &str) -> Option<CityMetadata> {
        let url = format!(
            "{}/{}?fields=name,population,currencies",
            self.base_url,
            city.to_lowercase()
        );
        let resp = self.client.get(&url).send().ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let countries: Vec<CountryInfo> = resp.json().ok()?;
        let info = countries.into_iter().next()?;
        let currency = info.currencies.keys().min()?.clone();
        Some(CityMetadata {
            country: info.name.common,
            currency,
            population: format_magnitude(info.population as f64),
        })
    }
}

impl CityEnrich for RestCountries {
    fn enrich(&self, city: &str) -> Option<CityMetadata> {
        let metadata = self.fetch(city);
        if metadata.is_none() {
            tracing::debug!(city, "no enrichment data");
        }
        metadata
    }
}
