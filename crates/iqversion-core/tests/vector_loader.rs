//! JSON test vector loader shared by payload/stanza tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::fs;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    pub xml: String,
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    /// Stanza error condition, e.g. "bad-request".
    pub condition: String,
}

pub fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

/// Optional string field of an `expect` block; JSON null means absent.
pub fn field<'a>(ex: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    ex.get(key).and_then(|v| v.as_str())
}
