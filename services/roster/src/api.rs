use serde::{Deserialize, Serialize};

use crate::{
    RosterError,
    guard::ClearOutcome,
    ingest::LoadReport,
};

pub const CLEARED_MESSAGE: &str = "cleared blob/table";
pub const NO_MATCH_MESSAGE: &str = "no match found";

/// Response envelope for load, query and clear.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationResult {
    pub is_query: bool,
    #[serde(default)]
    pub query_res: Vec<String>,
    pub success: bool,
    pub msg: String,
    /// Error taxonomy entry on failure; not part of the wire envelope.
    #[serde(skip)]
    pub error_kind: Option<&'static str>,
}

impl OperationResult {
    pub fn failure(is_query: bool, err: &RosterError) -> Self {
        Self {
            is_query,
            query_res: Vec::new(),
            success: false,
            msg: err.to_string(),
            error_kind: Some(err.kind()),
        }
    }

    pub fn from_load(result: Result<LoadReport, RosterError>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                msg: format!(
                    "loaded blob/table. Blob can be found <a href=\"{}\">here</a>",
                    report.archive_location
                ),
                ..Self::default()
            },
            Err(err) => Self::failure(false, &err),
        }
    }

    pub fn from_query(result: Result<Vec<String>, RosterError>) -> Self {
        match result {
            Ok(matches) => Self {
                is_query: true,
                msg: if matches.is_empty() {
                    NO_MATCH_MESSAGE.to_string()
                } else {
                    String::new()
                },
                query_res: matches,
                success: true,
                error_kind: None,
            },
            Err(err) => Self::failure(true, &err),
        }
    }

    pub fn from_clear(result: Result<ClearOutcome, RosterError>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                msg: CLEARED_MESSAGE.to_string(),
                ..Self::default()
            },
            Err(err) => Self::failure(false, &err),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
