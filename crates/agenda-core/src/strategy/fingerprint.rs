//! Deterministic cache keys derived from a [`SearchStrategy`].
//!
//! The fingerprint is a pure function of the strategy: field order, letter
//! case, accents and punctuation in names and attributes do not change it.
//! Information lookups about a named person are identity-determined, so their
//! conditions are left out of the key.

use super::{Condition, QueryKind, SearchStrategy};
use std::collections::BTreeSet;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// More distinct attributes than this collapse to [`COMPLETE_ATTRIBUTES`].
const MAX_DISTINCT_ATTRIBUTES: usize = 5;

/// Sentinel for "everything about the person".
const COMPLETE_ATTRIBUTES: &str = "completo";

/// Canonical attribute -> accepted spellings (already accent-folded).
///
/// Attributes not listed here are kept as written.
const ATTRIBUTE_SYNONYMS: &[(&str, &[&str])] = &[
    ("telefono", &["telefono", "celular", "movil", "numero"]),
    ("correo", &["correo", "email", "e-mail", "mail"]),
    ("direccion", &["direccion", "domicilio", "ubicacion"]),
    ("funcion", &["funcion", "puesto", "cargo", "rol", "trabajo"]),
];

/// Canonical condition field -> accepted spellings (already accent-folded).
const FIELD_SYNONYMS: &[(&str, &[&str])] = &[
    ("zona", &["zona", "area", "sector"]),
    ("funcion", &["funcion", "puesto", "cargo", "rol"]),
    ("estado_civil", &["estado_civil", "estado civil", "civil"]),
];

/// Canonical marital status -> accepted spellings.
const MARITAL_STATUS_VALUES: &[(&str, &[&str])] = &[
    ("casado", &["casado", "casada", "matrimonio"]),
    ("soltero", &["soltero", "soltera"]),
    ("divorciado", &["divorciado", "divorciada"]),
    ("viudo", &["viudo", "viuda"]),
];

/// Strip diacritics (`Á` -> `A`, `ñ` -> `n`) by decomposing and dropping
/// combining marks.
#[must_use]
pub fn fold_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Compute the cache fingerprint of a strategy.
///
/// Shape: `kind[:nombres=A|B][:atributos=x|y][:condiciones=f:v|g:w]`, with the
/// condition part omitted for [`QueryKind::Info`] strategies that name a person.
#[must_use]
pub fn fingerprint(strategy: &SearchStrategy) -> String {
    let names = normalize_names(&strategy.candidate_names);
    let attributes = normalize_attributes(&strategy.requested_attributes);

    let mut parts = vec![strategy.kind.as_str().to_string()];
    if !names.is_empty() {
        parts.push(format!("nombres={names}"));
    }
    if !attributes.is_empty() {
        parts.push(format!("atributos={attributes}"));
    }

    let identity_lookup = match strategy.kind {
        QueryKind::Info => !names.is_empty(),
        QueryKind::Listing | QueryKind::Filter | QueryKind::Count | QueryKind::General => false,
    };

    if !identity_lookup {
        let conditions = normalize_conditions(&strategy.conditions);
        if !conditions.is_empty() {
            parts.push(format!("condiciones={conditions}"));
        }
    }

    parts.join(":")
}

fn normalize_names(names: &[String]) -> String {
    let normalized: BTreeSet<String> = names.iter().filter_map(|name| normalize_name(name)).collect();
    normalized.into_iter().collect::<Vec<_>>().join("|")
}

/// Upper-case, fold accents, drop punctuation and sort the name tokens so
/// "Pérez Luis" and "LUIS PEREZ" agree.
fn normalize_name(name: &str) -> Option<String> {
    let folded: String = fold_accents(&name.trim().to_uppercase())
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let mut tokens: Vec<&str> = folded.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    tokens.sort_unstable();
    Some(tokens.join(" "))
}

fn normalize_attributes(attributes: &[String]) -> String {
    let cleaned: Vec<String> = attributes
        .iter()
        .map(|attr| fold_accents(&attr.trim().to_lowercase()))
        .filter(|attr| !attr.is_empty())
        .collect();

    let distinct: BTreeSet<&str> = cleaned.iter().map(String::as_str).collect();
    if distinct.len() > MAX_DISTINCT_ATTRIBUTES
        || distinct.contains("todos")
        || distinct.contains("all")
    {
        return COMPLETE_ATTRIBUTES.to_string();
    }

    let canonical: BTreeSet<&str> = distinct
        .into_iter()
        .map(|attr| canonicalize(attr, ATTRIBUTE_SYNONYMS))
        .collect();
    canonical.into_iter().collect::<Vec<_>>().join("|")
}

fn normalize_conditions(conditions: &[Condition]) -> String {
    let mut normalized: Vec<String> = conditions
        .iter()
        .filter_map(normalize_condition)
        .collect();
    normalized.sort_unstable();
    normalized.dedup();
    normalized.join("|")
}

fn normalize_condition(condition: &Condition) -> Option<String> {
    let field = fold_accents(&condition.field.trim().to_lowercase());
    let value = fold_accents(&condition.value.trim().to_lowercase());
    if field.is_empty() || value.is_empty() {
        return None;
    }

    let field = canonicalize(&field, FIELD_SYNONYMS);
    let value = if field == "estado_civil" {
        canonicalize(&value, MARITAL_STATUS_VALUES).to_string()
    } else {
        value
    };

    let operator = condition.operator.trim().to_lowercase();
    if operator.is_empty() || operator == "=" || operator == "==" {
        Some(format!("{field}:{value}"))
    } else {
        Some(format!("{field}{operator}{value}"))
    }
}

fn canonicalize<'a>(term: &'a str, table: &[(&'static str, &[&str])]) -> &'a str {
    table
        .iter()
        .find(|(_, spellings)| spellings.contains(&term))
        .map_or(term, |(canonical, _)| *canonical)
}
