//! Field and tenant types shared by every pipeline stage.

use std::fmt;

use crate::error::TenantError;

/// Name of the canonical message field.
pub const MESSAGE_FIELD: &str = "_msg";

/// Default name of the field carrying the record timestamp.
pub const DEFAULT_TIME_FIELD: &str = "_time";

/// A single decoded `name=value` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Logical namespace isolating one customer's rows from another's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TenantId {
    pub account_id: u32,
    pub project_id: u32,
}

impl TenantId {
    pub fn new(account_id: u32, project_id: u32) -> Self {
        Self {
            account_id,
            project_id,
        }
    }

    /// Build a tenant from the raw `AccountID` / `ProjectID` header values.
    ///
    /// Missing or empty values default to `0`.
    pub fn from_header_values(
        account: Option<&str>,
        project: Option<&str>,
    ) -> Result<Self, TenantError> {
        Ok(Self {
            account_id: parse_tenant_part("AccountID", account)?,
            project_id: parse_tenant_part("ProjectID", project)?,
        })
    }
}

fn parse_tenant_part(header: &'static str, value: Option<&str>) -> Result<u32, TenantError> {
    match value.map(str::trim) {
        None | Some("") => Ok(0),
        Some(raw) => raw.parse::<u32>().map_err(|source| TenantError {
            header,
            value: raw.to_string(),
            source,
        }),
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.account_id, self.project_id)
    }
}
