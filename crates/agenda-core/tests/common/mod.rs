#![allow(missing_docs, dead_code, clippy::unwrap_used)]

use agenda_core::{LanguageModel, LlmRequest, Purpose, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Model with one fixed reply per purpose.
#[derive(Default)]
pub struct CannedModel {
    replies: HashMap<Purpose, String>,
    calls: Mutex<Vec<Purpose>>,
}

impl CannedModel {
    pub fn reply(mut self, purpose: Purpose, text: &str) -> Self {
        self.replies.insert(purpose, text.to_string());
        self
    }

    pub fn calls(&self, purpose: Purpose) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| **p == purpose)
            .count()
    }
}

#[async_trait]
impl LanguageModel for CannedModel {
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        self.calls.lock().unwrap().push(request.purpose);
        self.replies
            .get(&request.purpose)
            .cloned()
            .ok_or_else(|| agenda_core::Error::Llm(format!("no reply for {}", request.purpose)))
    }
}

/// Directory database with three contacts.
pub fn seed_contacts(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE contactos (
            id INTEGER PRIMARY KEY,
            nombre_completo TEXT NOT NULL,
            telefono TEXT,
            correo_electronico TEXT,
            departamento TEXT
        );
        INSERT INTO contactos (nombre_completo, telefono, correo_electronico, departamento) VALUES
            ('PEREZ IBAÑEZ LUIS', '618 123 4567', 'luis.perez@example.com', 'Ventas'),
            ('MARTINEZ SOTO ANA', '618 765 4321', 'ana.martinez@example.com', 'Ventas'),
            ('ALVARADO RUIZ JOSE', NULL, 'jose.alvarado@example.com', 'Compras');",
    )
    .unwrap();
}
