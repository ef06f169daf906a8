use std::collections::BTreeSet;

use crate::domain::RequestDetails;

/// Replacement for local-only `extra` values.
pub const REDACTED: &str = "<redacted>";

/// Copy of `details` safe to send to the decision service.
///
/// Every `extra` key in `fields` that is present has its value replaced by
/// [`REDACTED`]. Absent keys are not added.
pub fn redact(details: &RequestDetails, fields: &BTreeSet<&'static str>) -> RequestDetails {
    let mut redacted = details.clone();
    for field in fields {
        if let Some(value) = redacted.extra.get_mut(*field) {
            *value = REDACTED.to_string();
        }
    }
    redacted
}
