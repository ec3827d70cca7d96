//! Parser for `docker buildx du --verbose`
//!
//! The verbose listing is a sequence of blank-line separated blocks, one per
//! cache record, each line being `Key:<tabs>Value`. The trailing summary
//! block has no `ID` and is skipped.

use crate::error::{DkrError, DkrResult};
use crate::orchestration::types::CacheRecord;
use std::collections::HashMap;

/// Parse the verbose cache usage listing into records
pub fn parse_cache_usage(listing: &str) -> DkrResult<Vec<CacheRecord>> {
    let mut records = Vec::new();

    for block in listing.split("\n\n") {
        let fields = parse_block(block);
        let Some(id) = fields.get("ID") else {
            continue;
        };

        let shared = match fields.get("Shared").copied() {
            Some("true") => true,
            Some("false") => false,
            other => {
                return Err(DkrError::CacheUsageParse(format!(
                    "record {id} has Shared value {other:?}"
                )))
            }
        };

        records.push(CacheRecord {
            id: id.to_string(),
            description: fields.get("Description").copied().unwrap_or_default().to_string(),
            shared,
        });
    }

    Ok(records)
}

fn parse_block(block: &str) -> HashMap<&str, &str> {
    block
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(":\t")?;
            Some((key.trim(), value.trim_start_matches('\t')))
        })
        .collect()
}
