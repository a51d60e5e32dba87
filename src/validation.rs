use std::sync::Arc;
use thiserror::Error;
use crate::blockchain::{AdapterRegistry, NetworkAdapter};

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Invalid {net} address: {address}")]
    InvalidAddress { net: String, address: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Operation {op} is not supported on {net}")]
    UnsupportedOperation { net: String, op: String },
}

pub fn require<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::MissingParameter(name.to_string())),
    }
}

pub fn validate_network(registry: &AdapterRegistry, net: &str) -> Result<Arc<dyn NetworkAdapter>, ValidationError> {
    registry
        .get(net)
        .ok_or_else(|| ValidationError::UnsupportedNetwork(net.to_string()))
}

/// Resolves the network and checks the address with that network's adapter.
pub fn validate_address(
    registry: &AdapterRegistry,
    net: &str,
    address: &str,
) -> Result<Arc<dyn NetworkAdapter>, ValidationError> {
    let adapter = validate_network(registry, net)?;

    if address.trim().is_empty() {
        return Err(ValidationError::MissingParameter("address".to_string()));
    }
    if !adapter.validate_address(address) {
        return Err(ValidationError::InvalidAddress {
            net: net.to_string(),
            address: address.to_string(),
        });
    }

    Ok(adapter)
}

pub fn validate_offset(offset: Option<i64>) -> Result<i64, ValidationError> {
    match offset.unwrap_or(0) {
        o if o < 0 => Err(ValidationError::InvalidParameter("offset must be non-negative".to_string())),
        o => Ok(o),
    }
}

pub fn validate_limit(limit: Option<i64>) -> Result<i64, ValidationError> {
    match limit.unwrap_or(100) {
        l if (1..=1000).contains(&l) => Ok(l),
        _ => Err(ValidationError::InvalidParameter("limit must be between 1 and 1000".to_string())),
    }
}

/// Checks an epoch-millisecond range.
pub fn validate_range(date_from: i64, date_to: i64) -> Result<(), ValidationError> {
    if date_from < 0 || date_to < 0 {
        return Err(ValidationError::InvalidParameter("dates must be non-negative".to_string()));
    }
    if date_from > date_to {
        return Err(ValidationError::InvalidParameter("from must not be after to".to_string()));
    }
    Ok(())
}

/// Checks that a chart over `[date_from, date_to]` with buckets of `width` stays
/// within `max_points` buckets.
pub fn validate_chart_span(date_from: i64, date_to: i64, width: i64, max_points: i64) -> Result<(), ValidationError> {
    if width <= 0 {
        return Err(ValidationError::InvalidParameter("width must be positive".to_string()));
    }
    let buckets = date_to.saturating_sub(date_from) / width;
    if buckets > max_points {
        return Err(ValidationError::InvalidParameter(format!(
            "range spans {} buckets, at most {} allowed",
            buckets, max_points
        )));
    }
    Ok(())
}
