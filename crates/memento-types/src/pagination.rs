//! Cursor/offset pagination shared by the entity and relationship list
//! operations (spec §4.2: "pagination uses either offset+limit or an
//! opaque cursor encoding `(orderByValue, id)`").

use base64_cursor::{decode_cursor, encode_cursor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub limit: usize,
    pub offset: Option<usize>,
    pub cursor: Option<String>,
    pub order_by: Option<String>,
    pub order_direction: OrderDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub next_cursor: Option<String>,
}

/// Opaque cursor encoding `(order_by_value, id)`, stable under concurrent
/// writes because it never references a row offset.
pub mod base64_cursor {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    pub fn encode_cursor(order_by_value: &str, id: &str) -> String {
        URL_SAFE_NO_PAD.encode(format!("{order_by_value}\u{0}{id}"))
    }

    pub fn decode_cursor(cursor: &str) -> Option<(String, String)> {
        let raw = URL_SAFE_NO_PAD.decode(cursor).ok()?;
        let text = String::from_utf8(raw).ok()?;
        let mut parts = text.splitn(2, '\u{0}');
        let order_by_value = parts.next()?.to_string();
        let id = parts.next()?.to_string();
        Some((order_by_value, id))
    }
}

pub fn make_cursor(order_by_value: &str, id: &str) -> String {
    encode_cursor(order_by_value, id)
}

pub fn parse_cursor(cursor: &str) -> Option<(String, String)> {
    decode_cursor(cursor)
}
