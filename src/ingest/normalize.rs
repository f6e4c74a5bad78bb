// src/ingest/normalize.rs
//! Field normalizer: one upstream record (nested API study or scraped row) in,
//! zero or one `CanonicalTrial` out.
//!
//! Missing sub-groups and leaves default to empty values. A record whose shape
//! is wrong (non-object, wrong JSON type) or that carries no identifier is
//! logged with its batch index and skipped; the rest of the batch continues.

use metrics::counter;
use serde_json::{Map, Value};

use crate::ingest::error::NormalizeError;
use crate::ingest::types::{CanonicalTrial, Provenance, RawRecord, ScrapedRow};

type Object = Map<String, Value>;

/// Normalize text scraped from markup: decode entities, strip tags, fold whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. NBSP)
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1000 chars
    if out.chars().count() > 1000 {
        out = out.chars().take(1000).collect();
    }

    out
}

/// Single entry point: dispatch on the record's shape tag.
/// Never fails; a bad record is logged with `index` and yields `None`.
pub fn normalize_record(
    index: usize,
    record: &RawRecord,
    provenance: Provenance,
) -> Option<CanonicalTrial> {
    let res = match record {
        RawRecord::Nested(v) => normalize_nested(v, provenance),
        RawRecord::Scraped(row) => normalize_scraped(row, provenance),
    };
    match res {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::warn!(
                target: "ingest",
                index,
                registry = provenance.registry.key(),
                error = %e,
                "skipping record that failed normalization"
            );
            None
        }
    }
}

/// Normalize a whole batch. Returns kept trials (in input order) and the skip count.
pub fn normalize_batch(
    records: &[RawRecord],
    provenance: Provenance,
) -> (Vec<CanonicalTrial>, usize) {
    let mut out = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for (i, rec) in records.iter().enumerate() {
        match normalize_record(i, rec, provenance) {
            Some(t) => out.push(t),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        counter!("ingest_normalize_failures_total", "registry" => provenance.registry.key())
            .increment(skipped as u64);
    }
    (out, skipped)
}

fn normalize_nested(record: &Value, provenance: Provenance) -> Result<CanonicalTrial, NormalizeError> {
    let root = record.as_object().ok_or(NormalizeError::NotAnObject)?;
    // Full API studies wrap everything in `protocolSection`; field-filtered
    // responses and fixtures sometimes hand us the section directly.
    let protocol = match sub_group(Some(root), "protocolSection")? {
        Some(p) => Some(p),
        None => Some(root),
    };

    let ident = sub_group(protocol, "identificationModule")?;
    let status = sub_group(protocol, "statusModule")?;
    let design = sub_group(protocol, "designModule")?;
    let conditions = sub_group(protocol, "conditionsModule")?;
    let sponsors = sub_group(protocol, "sponsorCollaboratorsModule")?;

    let id = leaf_str(ident, "nctId")?;
    if id.is_empty() {
        return Err(NormalizeError::MissingId);
    }

    let official = leaf_str(ident, "officialTitle")?;
    let title = if official.is_empty() {
        leaf_str(ident, "briefTitle")?
    } else {
        official
    };

    Ok(CanonicalTrial {
        id,
        title,
        conditions: leaf_strings(conditions, "conditions")?,
        study_type: leaf_str(design, "studyType")?,
        status: leaf_str(status, "overallStatus")?,
        start_date: leaf_str(sub_group(status, "startDateStruct")?, "date")?,
        completion_date: leaf_str(sub_group(status, "completionDateStruct")?, "date")?,
        sponsor: leaf_str(sub_group(sponsors, "leadSponsor")?, "name")?,
        source: provenance.tag(),
    })
}

fn normalize_scraped(
    row: &ScrapedRow,
    provenance: Provenance,
) -> Result<CanonicalTrial, NormalizeError> {
    let clean = |v: &Option<String>| v.as_deref().map(normalize_text).unwrap_or_default();

    let id = clean(&row.eudract_id);
    if id.is_empty() {
        return Err(NormalizeError::MissingId);
    }

    let conditions = row
        .condition
        .as_deref()
        .map(|c| {
            c.split(';')
                .map(normalize_text)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(CanonicalTrial {
        id,
        title: clean(&row.public_title),
        conditions,
        study_type: clean(&row.study_type),
        status: clean(&row.status),
        start_date: clean(&row.start_date),
        completion_date: clean(&row.completion_date),
        sponsor: clean(&row.main_sponsor),
        source: provenance.tag(),
    })
}

/// Descend into a named sub-group. Absent or `null` → `None` (treated as empty).
fn sub_group<'a>(
    parent: Option<&'a Object>,
    field: &'static str,
) -> Result<Option<&'a Object>, NormalizeError> {
    match parent.and_then(|p| p.get(field)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(m)) => Ok(Some(m)),
        Some(_) => Err(NormalizeError::UnexpectedType {
            field,
            expected: "object",
        }),
    }
}

fn leaf_str(parent: Option<&Object>, field: &'static str) -> Result<String, NormalizeError> {
    match parent.and_then(|p| p.get(field)) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(NormalizeError::UnexpectedType {
            field,
            expected: "string",
        }),
    }
}

fn leaf_strings(
    parent: Option<&Object>,
    field: &'static str,
) -> Result<Vec<String>, NormalizeError> {
    let bad = NormalizeError::UnexpectedType {
        field,
        expected: "array of strings",
    };
    match parent.and_then(|p| p.get(field)) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for it in items {
                match it {
                    Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
                    Value::String(_) => {}
                    _ => return Err(bad),
                }
            }
            Ok(out)
        }
        Some(_) => Err(bad),
    }
}
