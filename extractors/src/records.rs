use serde_json::Value;
use shared_types::{DirectoryEntry, OutputRecord, Provenance};
use tracing::warn;

use crate::ldap_directory::ad_values::attribute_to_json;

pub const DN_FIELD: &str = "dn";
pub const EXTRACT_TIME_FIELD: &str = "extract_time";

/// Build the output record for one directory entry.
///
/// Attributes are copied first, then `dn` if the entry has no attribute of that name, then the
/// provenance fields. Provenance always overwrites a same-named directory attribute.
pub fn annotate(
    entry: &DirectoryEntry,
    provenance: &Provenance,
    extract_time: Option<&str>,
) -> OutputRecord {
    let mut record = OutputRecord::new();

    for (name, values) in &entry.attributes {
        record.insert(name.clone(), attribute_to_json(name, values));
    }

    if !record.contains(DN_FIELD) {
        record.insert(DN_FIELD, Value::String(entry.dn.clone()));
    }

    if let Some(extract_time) = extract_time {
        if record
            .insert(EXTRACT_TIME_FIELD, Value::String(extract_time.to_string()))
            .is_some()
        {
            warn!(dn = %entry.dn, attribute = EXTRACT_TIME_FIELD, "Directory attribute overwritten by extract time");
        }
    }

    for (field, value) in provenance.fields() {
        if record
            .insert(field, Value::String(value.to_string()))
            .is_some()
        {
            warn!(dn = %entry.dn, attribute = field, "Directory attribute overwritten by provenance field");
        }
    }

    record
}
