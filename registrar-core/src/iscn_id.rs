// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SCHEME: &str = "iscn://";
const REGISTRY: &str = "likecoin-chain";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid record id: {0}")]
pub struct IscnIdError(pub String);

/// Derived record identifier: `iscn://likecoin-chain/<id>[/<version>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IscnId {
    id: String,
    version: Option<u64>,
}

impl IscnId {
    pub fn parse(value: &str) -> Result<Self, IscnIdError> {
        let invalid = || IscnIdError(value.to_string());
        let rest = value
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix(REGISTRY))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;

        let (id, version) = match rest.split_once('/') {
            Some((id, version)) => (id, Some(version)),
            None => (rest, None),
        };
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid());
        }

        let version = match version {
            None | Some("") => None,
            Some(digits) if digits.chars().all(|c| c.is_ascii_digit()) => {
                Some(digits.parse().map_err(|_| invalid())?)
            }
            Some(_) => return Err(invalid()),
        };

        Ok(Self {
            id: id.to_string(),
            version,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Version-less form, stable across record updates.
    pub fn prefix(&self) -> String {
        format!("{SCHEME}{REGISTRY}/{}", self.id)
    }
}

impl fmt::Display for IscnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{REGISTRY}/{}", self.id)?;
        if let Some(version) = self.version {
            write!(f, "/{version}")?;
        }
        Ok(())
    }
}

impl FromStr for IscnId {
    type Err = IscnIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
