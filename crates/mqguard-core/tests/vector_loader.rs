//! JSON test vector loader shared by matcher tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use serde::Deserialize;

use mqguard_core::MatcherOptions;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    #[serde(default)]
    pub options: Option<MatcherOptions>,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub cases: Vec<MatchCase>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct MatchCase {
    pub topic: String,
    /// Patterns expected to match, in any order.
    pub matched: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
    pub msg: String,
}

pub fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}
