//! Author name parsing and deduplication
//!
//! Documents name people as free text ("Іван Петренко (Київ)"). Only names
//! that reduce to exactly two capitalized tokens are stored; the rest are
//! reported back as warnings.

use std::collections::HashMap;

use chgk_common::Result;
use sqlx::SqliteConnection;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthorName {
    pub first_name: String,
    pub last_name: String,
}

fn strip_parentheticals(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn is_name_token(token: &str) -> bool {
    let mut chars = token.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_uppercase()
        && token
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, '\'' | '’' | 'ʼ' | '-'))
}

/// "Ім'я Прізвище" with an optional parenthetical city
pub fn parse_author_name(raw: &str) -> Option<AuthorName> {
    let cleaned = strip_parentheticals(raw);
    let cleaned = cleaned.trim().trim_end_matches(['.', ',', ';']);
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    match tokens.as_slice() {
        [first, last] if is_name_token(first) && is_name_token(last) => Some(AuthorName {
            first_name: first.to_string(),
            last_name: last.to_string(),
        }),
        _ => None,
    }
}

/// Author ids resolved during one import
#[derive(Debug, Default)]
pub struct AuthorCache {
    ids: HashMap<AuthorName, Uuid>,
}

impl AuthorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing id for the name, inserting the author on first sight
    pub async fn resolve(&mut self, conn: &mut SqliteConnection, name: &AuthorName) -> Result<Uuid> {
        if let Some(id) = self.ids.get(name) {
            return Ok(*id);
        }

        sqlx::query(
            r#"
            INSERT INTO authors (id, first_name, last_name)
            VALUES (?, ?, ?)
            ON CONFLICT(first_name, last_name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&name.first_name)
        .bind(&name.last_name)
        .execute(&mut *conn)
        .await?;

        let id: String =
            sqlx::query_scalar("SELECT id FROM authors WHERE first_name = ? AND last_name = ?")
                .bind(&name.first_name)
                .bind(&name.last_name)
                .fetch_one(&mut *conn)
                .await?;

        let id = Uuid::parse_str(&id)
            .map_err(|e| chgk_common::Error::Internal(format!("Bad author id {}: {}", id, e)))?;
        self.ids.insert(name.clone(), id);
        Ok(id)
    }

    /// Resolve a list of raw names, skipping invalid ones and duplicates
    ///
    /// `context` prefixes the warning ("Tour 2 editor").
    pub async fn resolve_all(
        &mut self,
        conn: &mut SqliteConnection,
        raw_names: &[String],
        context: &str,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(raw_names.len());
        for raw in raw_names {
            let Some(name) = parse_author_name(raw) else {
                warnings.push(format!("{}: \"{}\" is not a first and last name, skipped", context, raw.trim()));
                continue;
            };
            let id = self.resolve(&mut *conn, &name).await?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
