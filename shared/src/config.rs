use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::SdkConfig;

pub const DEFAULT_TABLE_NAME: &str = "product-inventory";
pub const DEFAULT_REGION: &str = "us-west-2";

/// Settings for the inventory function, read once per cold start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    pub table_name: String,
    /// When set, PATCH may only touch these attributes.
    pub updatable_fields: Option<Vec<String>>,
    /// `Limit` sent with every scan request.
    pub scan_page_size: Option<i32>,
}

impl InventoryConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let table_name = lookup("TABLE_NAME")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());

        let updatable_fields = lookup("UPDATABLE_FIELDS").map(|fields| {
            fields
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(|field| field.to_string())
                .collect::<Vec<String>>()
        });

        let scan_page_size = parse_var::<i32, _>(&lookup, "SCAN_PAGE_SIZE")?;
        if let Some(size) = scan_page_size {
            if size < 1 {
                return Err(anyhow!("SCAN_PAGE_SIZE must be at least 1, got {}", size));
            }
        }

        Ok(Self {
            table_name,
            updatable_fields,
            scan_page_size,
        })
    }
}

/// Reads and parses an optional variable. Unset or blank yields `None`.
pub fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{} has an invalid value {:?}: {}", name, raw, e)),
        _ => Ok(None),
    }
}

/// Loads the SDK config, falling back to the inventory's home region.
pub async fn load_aws_config() -> SdkConfig {
    let region = RegionProviderChain::default_provider().or_else(DEFAULT_REGION);
    aws_config::from_env().region(region).load().await
}
