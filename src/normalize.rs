//! Single-row normalization and validation.
//!
//! [`normalize_record()`] runs the stages in a fixed order and stops at the
//! first failure: required columns, nulls, text normalization, age parsing,
//! age threshold.

use std::borrow::Cow;

use crate::record::{
    AGE_FIELD, CITY_FIELD, CanonicalRecord, NAME_FIELD, REQUIRED_FIELDS, RawRecord, RejectReason,
};

pub const DEFAULT_MIN_AGE: i64 = 25;

pub fn normalize_record(raw: &RawRecord, min_age: i64) -> Result<CanonicalRecord, RejectReason> {
    if !REQUIRED_FIELDS.iter().all(|field| raw.contains_key(field)) {
        return Err(RejectReason::MissingRequiredColumns);
    }

    let (Some(name_raw), Some(age_raw), Some(city_raw)) =
        (raw.get(NAME_FIELD), raw.get(AGE_FIELD), raw.get(CITY_FIELD))
    else {
        return Err(RejectReason::NullRequiredField);
    };

    let name = normalize_name(name_raw).ok_or(RejectReason::NormalizationFailure)?;
    let city = normalize_city(city_raw).ok_or(RejectReason::NormalizationFailure)?;

    let age = parse_age(age_raw).ok_or(RejectReason::AgeNotInteger)?;
    if age < min_age {
        return Err(RejectReason::AgeBelowThreshold { threshold: min_age });
    }

    Ok(CanonicalRecord { name, age, city })
}

/// Trims, lower-cases, then upper-cases the first character only.
///
/// Returns `None` when the text carries characters no canonical name may hold.
pub fn normalize_name(value: &str) -> Option<String> {
    let lowered = clean_text(value)?;
    let mut chars = lowered.chars();
    let normalized = match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(lowered.len());
            push_titlecase(&mut out, first);
            out.extend(chars);
            out
        }
        None => String::new(),
    };
    Some(normalized)
}

/// Trims, lower-cases, then upper-cases the first letter of every
/// whitespace-separated word. Inner spacing is kept as given.
pub fn normalize_city(value: &str) -> Option<String> {
    let lowered = clean_text(value)?;
    let mut normalized = String::with_capacity(lowered.len());
    let mut at_word_start = true;
    for ch in lowered.chars() {
        if ch.is_whitespace() {
            at_word_start = true;
            normalized.push(ch);
        } else if at_word_start {
            at_word_start = false;
            push_titlecase(&mut normalized, ch);
        } else {
            normalized.push(ch);
        }
    }
    Some(normalized)
}

/// Base-10 integer with optional sign; surrounding whitespace is ignored.
pub fn parse_age(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

/// Appends the titlecase form of `ch`.
///
/// This differs from uppercase for the Latin digraphs (`ǆ` → `ǅ`) and for
/// characters whose uppercase expands (`ß` → `Ss`, `ﬁ` → `Fi`).
fn push_titlecase(out: &mut String, ch: char) {
    let digraph = match ch {
        '\u{01C4}'..='\u{01C6}' => Some('\u{01C5}'),
        '\u{01C7}'..='\u{01C9}' => Some('\u{01C8}'),
        '\u{01CA}'..='\u{01CC}' => Some('\u{01CB}'),
        '\u{01F1}'..='\u{01F3}' => Some('\u{01F2}'),
        _ => None,
    };
    if let Some(title) = digraph {
        out.push(title);
        return;
    }
    let mut upper = ch.to_uppercase();
    if let Some(head) = upper.next() {
        out.push(head);
    }
    out.extend(upper.flat_map(char::to_lowercase));
}

// Replacement characters come from undecodable input bytes.
fn clean_text(value: &str) -> Option<Cow<'_, str>> {
    let trimmed = value.trim();
    if trimmed.contains(char::REPLACEMENT_CHARACTER) {
        return None;
    }
    if trimmed.chars().any(|ch| ch.to_lowercase().ne(std::iter::once(ch))) {
        Some(Cow::Owned(trimmed.to_lowercase()))
    } else {
        Some(Cow::Borrowed(trimmed))
    }
}
