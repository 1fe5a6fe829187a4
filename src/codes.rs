//! Project codes and the rules deciding which project a child row belongs to.
//!
//! Sibling projects share a base code and differ by sub-code (`P5066-I1`,
//! `P5066-I2`), so full-code equality always wins over the looser legacy
//! fallbacks.
use crate::types::{Project, RecordCodes};

/// Build the canonical full code from a base code and a sub-code.
///
/// ```text
/// ("P5066", "")          -> "P5066"
/// ("P5066", "I1")        -> "P5066-I1"
/// ("P5066", "-I1")       -> "P5066-I1"
/// ("P5066", "P5066-I1")  -> "P5066-I1"
/// ("", "I1")             -> "I1"
/// ```
pub fn build_full_code(code: &str, sub_code: &str) -> String {
    let code = code.trim();
    let sub_code = sub_code.trim();
    if sub_code.is_empty() {
        return code.to_string();
    }
    if sub_code.to_uppercase().starts_with(&code.to_uppercase()) {
        return sub_code.to_string();
    }
    if sub_code.starts_with('-') {
        format!("{}{}", code, sub_code)
    } else {
        format!("{}-{}", code, sub_code)
    }
}

/// Canonical full code of a project: the stored value when present,
/// otherwise built from code and sub-code.
pub fn project_full_code(codes: &RecordCodes) -> String {
    if codes.full_code.is_empty() {
        build_full_code(&codes.code, &codes.sub_code)
    } else {
        codes.full_code.clone()
    }
}

/// Which rule attached a record to a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    FullCode,
    BuiltFullCode,
    SubProjectPrefix,
    BareCode,
}

/// Decide whether a child row belongs to `project`, returning the first rule
/// that matched.
pub fn match_rule(record: &RecordCodes, project: &Project) -> Option<MatchRule> {
    let project_full = project.full_code.as_str();
    if project_full.is_empty() {
        return None;
    }

    if !record.full_code.is_empty() && record.full_code.eq_ignore_ascii_case(project_full) {
        return Some(MatchRule::FullCode);
    }

    // A stored full code is authoritative; only rows without one are built.
    let built = if record.code.is_empty() || !record.full_code.is_empty() {
        String::new()
    } else {
        build_full_code(&record.code, &record.sub_code)
    };
    if !built.is_empty() && built.eq_ignore_ascii_case(project_full) {
        return Some(MatchRule::BuiltFullCode);
    }

    if project.has_sub_code() {
        let record_full = if record.full_code.is_empty() {
            built.as_str()
        } else {
            record.full_code.as_str()
        };
        if has_code_prefix(record_full, project_full) {
            return Some(MatchRule::SubProjectPrefix);
        }
        return None;
    }

    // Legacy rows that carry nothing but a base code.
    let has_no_full_code = record.full_code.is_empty() && record.sub_code.is_empty();
    if has_no_full_code && !record.code.is_empty() && record.code.eq_ignore_ascii_case(&project.code)
    {
        return Some(MatchRule::BareCode);
    }
    None
}

pub fn belongs_to(record: &RecordCodes, project: &Project) -> bool {
    match_rule(record, project).is_some()
}

/// `prefix` followed by the end of the code or a separator, so `P5066-I1`
/// never claims `P5066-I10`.
fn has_code_prefix(full_code: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    let Some(head) = full_code.get(..prefix.len()) else {
        return false;
    };
    head.eq_ignore_ascii_case(prefix)
        && matches!(full_code[prefix.len()..].chars().next(), None | Some('-' | ' '))
}
