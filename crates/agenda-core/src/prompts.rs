//! Prompt text for each model call.
//!
//! Wording is free to change. What callers rely on is the JSON shape each
//! prompt asks for, which matches the serde types in [`crate::strategy`],
//! [`crate::store`] and [`crate::pipeline`].

use crate::context::Turn;
use crate::pipeline::Evaluation;
use crate::store::{SchemaPreview, SqlOutcome};
use crate::strategy::SearchStrategy;
use serde::Serialize;
use std::fmt::Write as _;

/// Shared inputs for the grounded prompts.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// Schema and sample data.
    pub preview: &'a SchemaPreview,
    /// Earlier turns, oldest first.
    pub history: &'a [Turn],
    /// Contacts table name.
    pub table: &'a str,
    /// Rows embedded in prompts at most.
    pub max_rows: usize,
}

const NAME_ORDER_NOTE: &str = "\
Los nombres están guardados como [Apellido Paterno] [Apellido Materno] [Nombre(s)], \
por ejemplo \"PEREZ IBAÑEZ LUIS\" para Luis Pérez Ibáñez. Una búsqueda por \"Luis\" o por \
\"Pérez\" debe encontrar a esa persona.";

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn database_section(preview: &SchemaPreview, with_examples: bool) -> String {
    let mut out = String::from("INFORMACIÓN DE LA BASE DE DATOS:\n");
    let _ = writeln!(out, "- Total de registros: {}", preview.total_rows);
    if !preview.columns.is_empty() {
        let _ = writeln!(out, "- Columnas: {}", preview.columns.join(", "));
    }
    let _ = writeln!(out, "\nNombres (muestra):\n{}", pretty(&preview.sample_names));
    if with_examples && !preview.sample_rows.is_empty() {
        let _ = writeln!(out, "\nRegistros de ejemplo:\n{}", pretty(&preview.sample_rows));
    }
    out
}

fn history_section(history: &[Turn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("CONVERSACIÓN PREVIA (de la más antigua a la más reciente):\n");
    for turn in history {
        let _ = writeln!(out, "- Pregunta: \"{}\"\n  Respuesta: \"{}\"", turn.question, turn.answer);
    }
    out.push_str(
        "Si la pregunta actual es de seguimiento (usa \"su\", \"él\", \"ella\" o es muy corta), \
         usa la conversación previa para saber de quién se habla y mantén la coherencia con lo ya respondido.\n",
    );
    out
}

fn rows_section(rows: &SqlOutcome, max_rows: usize) -> String {
    let shown = &rows.rows[..rows.rows.len().min(max_rows)];
    format!(
        "RESULTADOS ({} registros en total, mostrando {}):\n{}",
        rows.total,
        shown.len(),
        pretty(shown)
    )
}

/// Canonicalize a free-form semantic cache key.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    format!(
        r#"Normaliza esta clave semántica de caché:

"{key}"

Reglas:
1. Todo en minúsculas, sin acentos ni caracteres especiales; los espacios se vuelven "_".
2. Conserva la forma "tipo:entidad:atributo".
3. Sinónimos a su forma canónica:
   - teléfono, celular, móvil, número, tel, cel -> telefono
   - correo, email, mail, e-mail, correo electrónico -> correo
   - dirección, domicilio, ubicación, residencia, vive -> direccion
   - información, datos, detalles, info -> informacion
   - trabajo, empleo, puesto, cargo, función -> funcion
   - estudios, formación, educación -> estudios
   - centro de trabajo, escuela, lugar de trabajo -> centro_trabajo
   - fecha de ingreso, antigüedad -> fecha_ingreso
   - zona, sector, área -> zona
   - cantidad, cuántos, total de -> conteo
4. Personas siempre como "nombre_apellido" usando nombre y apellido paterno
   ("Pérez Luis" -> "luis_perez").
5. Claves equivalentes deben producir exactamente la misma salida.

Ejemplos:
- "persona:Luis Pérez:celular" -> "persona:luis_perez:telefono"
- "persona:Pérez Luis:email" -> "persona:luis_perez:correo"
- "listado:zona:109:docentes" -> "listado:zona_109:docentes_frente_grupo"
- "conteo:zona:109:directores" -> "conteo:zona_109:directores"

Devuelve SOLO la clave normalizada."#
    )
}

/// Interpret a question as a [`SearchStrategy`].
#[must_use]
pub fn analyze(query: &str, ctx: &PromptContext<'_>) -> String {
    format!(
        r#"Analiza esta consulta sobre una agenda de contactos:

Consulta: {query}

{history}
{database}
{NAME_ORDER_NOTE}

Identifica qué se pregunta, qué personas se mencionan (considera variantes, apellidos
sueltos y errores ortográficos), qué atributos se piden y qué condiciones aplican.

Responde SOLO con JSON:
```json
{{
  "tipo_consulta": "informacion" | "listado" | "filtrado" | "conteo" | "general",
  "nombres_posibles": ["variante 1", "variante 2"],
  "atributos_solicitados": ["telefono", "correo"],
  "condiciones": [{{"campo": "zona", "operador": "=", "valor": "109"}}],
  "clave_semantica": "tipo:entidad:atributo",
  "explicacion": "breve explicación"
}}
```"#,
        history = history_section(ctx.history),
        database = database_section(ctx.preview, true),
    )
}

/// Turn a strategy into a parameterized SQL query.
#[must_use]
pub fn generate_search(strategy: &SearchStrategy, ctx: &PromptContext<'_>) -> String {
    format!(
        r#"Con esta estrategia de búsqueda:
{strategy}

{database}
{NAME_ORDER_NOTE}

Escribe una consulta SQLite de solo lectura sobre la tabla '{table}':
1. Usa parámetros posicionales "?" para cada valor.
2. Busca nombres en todas las columnas de nombre y tolera coincidencias parciales.
3. Ordena por relevancia (CASE WHEN) cuando busques personas.
4. Selecciona solo las columnas necesarias.
5. No uses LIMIT en listados salvo que se pida un número concreto.

Responde SOLO con JSON:
```json
{{
  "sql_query": "SELECT ...",
  "parameters": ["valor1"],
  "explanation": "breve explicación"
}}
```"#,
        strategy = pretty(strategy),
        database = database_section(ctx.preview, false),
        table = ctx.table,
    )
}

/// Judge the rows and optionally propose a replacement strategy.
#[must_use]
pub fn evaluate(
    query: &str,
    strategy: &SearchStrategy,
    rows: &SqlOutcome,
    ctx: &PromptContext<'_>,
) -> String {
    format!(
        r#"Consulta original: "{query}"

Estrategia utilizada:
{strategy}

{rows}

{database}
{NAME_ORDER_NOTE}

Evalúa si los resultados responden la consulta. Si no se encontró nada pero hay nombres
parecidos en la base de datos, propone una nueva estrategia que los busque.

Responde SOLO con JSON:
```json
{{
  "satisfactorio": true,
  "evaluacion": "tu evaluación",
  "refinamiento": {{
    "sugerencia": "cómo mejorar la búsqueda",
    "nueva_estrategia": {{ "tipo_consulta": "...", "nombres_posibles": [] }}
  }}
}}
```"#,
        strategy = pretty(strategy),
        rows = rows_section(rows, ctx.max_rows),
        database = database_section(ctx.preview, false),
    )
}

/// Phrase the final answer from the rows.
#[must_use]
pub fn respond(
    query: &str,
    strategy: &SearchStrategy,
    rows: &SqlOutcome,
    evaluation: &Evaluation,
    ctx: &PromptContext<'_>,
) -> String {
    format!(
        r#"Eres un asistente de agenda que conversa con el usuario.

PREGUNTA: {query}

ESTRATEGIA:
{strategy}

{rows}

EVALUACIÓN:
{evaluation}

{history}
{NAME_ORDER_NOTE}
Al responder escribe los nombres en orden natural: [Nombre(s)] [Apellido Paterno] [Apellido Materno].

Instrucciones:
- Responde con los resultados y con la conversación previa cuando sea relevante.
- Tono natural y amable, sin fórmulas como "Según los datos...".
- No preguntes si necesita algo más.
- Para listados muestra TODOS los resultados, uno por línea:
  1. Nombre: Juan Pérez - Teléfono: 123456789
- Si hay varias personas posibles, pregunta a cuál se refiere.
- No repitas texto.

RESPUESTA:"#,
        strategy = pretty(strategy),
        rows = rows_section(rows, ctx.max_rows),
        evaluation = pretty(evaluation),
        history = history_section(ctx.history),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Row;
    use crate::strategy::QueryKind;
    use serde_json::json;

    fn preview() -> SchemaPreview {
        SchemaPreview {
            columns: vec!["nombre_completo".into(), "telefono".into()],
            total_rows: 2,
            sample_names: vec!["PEREZ LUIS".into()],
            sample_rows: Vec::new(),
        }
    }

    #[test]
    fn analyze_includes_history_and_names() {
        let preview = preview();
        let history = vec![Turn {
            question: "¿quién es Luis?".into(),
            answer: "Luis Pérez es director.".into(),
        }];
        let ctx = PromptContext {
            preview: &preview,
            history: &history,
            table: "contactos",
            max_rows: 50,
        };

        let prompt = analyze("¿y su teléfono?", &ctx);
        assert!(prompt.contains("¿y su teléfono?"));
        assert!(prompt.contains("Luis Pérez es director."));
        assert!(prompt.contains("PEREZ LUIS"));
        assert!(prompt.contains("\"tipo_consulta\""));
    }

    #[test]
    fn rows_are_capped() {
        let preview = preview();
        let ctx = PromptContext {
            preview: &preview,
            history: &[],
            table: "contactos",
            max_rows: 2,
        };
        let rows: Vec<Row> = (0..5)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".into(), json!(i));
                row
            })
            .collect();
        let outcome = SqlOutcome {
            total: 5,
            rows,
        };

        let prompt = evaluate("q", &SearchStrategy::new(QueryKind::Listing), &outcome, &ctx);
        assert!(prompt.contains("5 registros en total, mostrando 2"));
        assert!(!prompt.contains("\"id\": 4"));
    }

    #[test]
    fn normalize_key_embeds_key() {
        assert!(normalize_key("persona:Luis Pérez:celular").contains("\"persona:Luis Pérez:celular\""));
    }
}
