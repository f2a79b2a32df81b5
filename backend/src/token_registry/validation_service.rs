use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::Token;

const MAX_ADDRESS_HEX_DIGITS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("address must be 0x followed by 1-40 hex digits, got '{0}'")]
    InvalidAddress(String),
    #[error("decimals must be between 0 and 255, got {0}")]
    InvalidDecimals(i64),
}

/// Body of `POST /tokens`. Everything is optional at the serde layer so that
/// missing fields surface as validation messages rather than decode errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub logo: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<i64>,
}

/// Canonical key form for an address: trimmed and lower-cased.
pub fn normalize_address(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_address(raw: &str) -> Result<String, ValidationError> {
    let address = normalize_address(raw);
    let digits = address.strip_prefix("0x").unwrap_or("");
    let well_formed = !digits.is_empty()
        && digits.len() <= MAX_ADDRESS_HEX_DIGITS
        && digits.chars().all(|c| c.is_ascii_hexdigit());
    if well_formed {
        Ok(address)
    } else {
        Err(ValidationError::InvalidAddress(raw.to_string()))
    }
}

impl CreateTokenRequest {
    /// Check the request and turn it into a record.
    ///
    /// `name` and `address` are mandatory. `symbol` and `decimals` may be left
    /// out by clients; ingestion always fills them. `flag` cannot be set here.
    pub fn into_token(self) -> Result<Token, ValidationError> {
        let name = required(self.name, "name")?;
        let address = validate_address(&required(self.address, "address")?)?;

        let decimals = match self.decimals {
            Some(d) => Some(u8::try_from(d).map_err(|_| ValidationError::InvalidDecimals(d))?),
            None => None,
        };

        Ok(Token {
            address,
            name,
            symbol: optional(self.symbol),
            decimals,
            flag: None,
            logo: optional(self.logo),
        })
    }
}
