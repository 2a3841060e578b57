//! Answer post-processing and the templated answers used when the model
//! cannot phrase one.

use crate::store::{Row, SqlOutcome};
use crate::strategy::{QueryKind, SearchStrategy};
use serde_json::Value;

/// Answer when nothing matched, including after an exhausted refinement.
pub const NO_RESULTS_ANSWER: &str =
    "No encontré resultados para tu consulta. ¿Podrías intentar con otra búsqueda?";

/// Collapse runs of identical lines into one.
#[must_use]
pub fn dedup_consecutive_lines(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in text.lines() {
        if kept.last() != Some(&line) {
            kept.push(line);
        }
    }
    kept.join("\n")
}

/// Answer built straight from the rows.
#[must_use]
pub fn fallback_answer(strategy: &SearchStrategy, rows: &SqlOutcome) -> String {
    if rows.total == 0 {
        return NO_RESULTS_ANSWER.to_string();
    }

    let info_answer = match strategy.kind {
        QueryKind::Info => rows
            .rows
            .first()
            .and_then(|first| info_answer(first, &strategy.requested_attributes)),
        QueryKind::Listing | QueryKind::Filter | QueryKind::Count | QueryKind::General => None,
    };

    info_answer.unwrap_or_else(|| {
        format!(
            "Encontré {} resultados para tu consulta, pero tuve problemas al generar una respuesta detallada.",
            rows.total
        )
    })
}

fn info_answer(row: &Row, attributes: &[String]) -> Option<String> {
    if attributes.is_empty() || !attributes.iter().all(|attr| row.contains_key(attr)) {
        return None;
    }
    let name = row.get("nombre_completo").and_then(Value::as_str)?;
    if name.trim().is_empty() {
        return None;
    }
    let name = display_name(name);

    let values: Vec<String> = attributes
        .iter()
        .filter_map(|attr| {
            let value = display_value(row.get(attr)?)?;
            Some(format!("{}: {value}", title_case(&attr.replace('_', " "))))
        })
        .collect();

    Some(if values.is_empty() {
        format!(
            "Encontré información para {name}, pero no puedo mostrar los detalles específicos que solicitaste."
        )
    } else {
        format!(
            "Encontré la siguiente información para {name}: {}.",
            values.join(", ")
        )
    })
}

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

/// Stored names are `PATERNO MATERNO NOMBRE`; show `Nombre Paterno Materno`.
#[must_use]
pub fn display_name(stored: &str) -> String {
    let parts: Vec<&str> = stored.split_whitespace().collect();
    let reordered = match parts.split_last() {
        Some((given, surnames)) if parts.len() >= 3 => format!("{given} {}", surnames.join(" ")),
        _ => parts.join(" "),
    };
    title_case(&reordered)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> SqlOutcome {
        SqlOutcome::from_rows(
            values
                .into_iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
        )
    }

    #[test]
    fn dedup_only_collapses_adjacent_repeats() {
        let text = "Hola\nHola\nLuis: 618\n\n\nHola";
        assert_eq!(dedup_consecutive_lines(text), "Hola\nLuis: 618\n\nHola");
    }

    #[test]
    fn display_name_moves_given_name_first() {
        assert_eq!(display_name("PEREZ IBAÑEZ LUIS"), "Luis Perez Ibañez");
        assert_eq!(display_name("MARTINEZ ANA"), "Martinez Ana");
    }

    #[test]
    fn info_fallback_lists_requested_attributes() {
        let strategy = SearchStrategy::new(QueryKind::Info).with_attributes(["telefono", "correo_electronico"]);
        let result = rows(vec![json!({
            "nombre_completo": "PEREZ IBAÑEZ LUIS",
            "telefono": "618 123 4567",
            "correo_electronico": "luis@example.com"
        })]);

        assert_eq!(
            fallback_answer(&strategy, &result),
            "Encontré la siguiente información para Luis Perez Ibañez: Telefono: 618 123 4567, Correo Electronico: luis@example.com."
        );
    }

    #[test]
    fn info_fallback_without_values() {
        let strategy = SearchStrategy::new(QueryKind::Info).with_attributes(["telefono"]);
        let result = rows(vec![json!({"nombre_completo": "ALVARADO JOSE", "telefono": null})]);
        assert_eq!(
            fallback_answer(&strategy, &result),
            "Encontré información para Alvarado Jose, pero no puedo mostrar los detalles específicos que solicitaste."
        );
    }

    #[test]
    fn generic_fallback_reports_count() {
        let strategy = SearchStrategy::new(QueryKind::Listing);
        let mut result = rows(vec![json!({"nombre_completo": "A B C"})]);
        result.total = 12;
        assert_eq!(
            fallback_answer(&strategy, &result),
            "Encontré 12 resultados para tu consulta, pero tuve problemas al generar una respuesta detallada."
        );
    }

    #[test]
    fn empty_results_use_no_results_answer() {
        let strategy = SearchStrategy::new(QueryKind::Info).with_attributes(["telefono"]);
        assert_eq!(fallback_answer(&strategy, &SqlOutcome::default()), NO_RESULTS_ANSWER);
    }
}
