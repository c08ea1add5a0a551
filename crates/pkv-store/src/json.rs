//! JSON parser/writer seam.
//!
//! The engine reads and writes documents through the [`JsonCodec`] trait;
//! any compliant JSON implementation can be injected. The default is
//! [`SerdeJsonCodec`], which pretty-prints on write so the on-disk
//! documents stay human-auditable.

use serde_json::{Map, Value};

/// A pluggable JSON parser and writer.
///
/// Errors are reported as plain messages; the engine translates them into
/// `JsonParserError` / `JsonGeneratorError` at the boundary.
pub trait JsonCodec: Send + Sync {
    /// Parse a byte buffer into a JSON tree.
    fn parse(&self, data: &[u8]) -> Result<Value, String>;

    /// Serialize a document root into bytes.
    fn generate(&self, root: &Map<String, Value>) -> Result<Vec<u8>, String>;
}

/// The `serde_json` implementation of [`JsonCodec`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SerdeJsonCodec;

impl JsonCodec for SerdeJsonCodec {
    fn parse(&self, data: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(data).map_err(|e| e.to_string())
    }

    fn generate(&self, root: &Map<String, Value>) -> Result<Vec<u8>, String> {
        serde_json::to_vec_pretty(root).map_err(|e| e.to_string())
    }
}
