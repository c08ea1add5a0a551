//! On-disk document shape and integrity tag for PKV.
//!
//! A store document is a JSON object mapping key names to tagged value
//! nodes of the form `{"t": <tag>, "v": <payload>}`. The document's bytes
//! are protected by a companion file holding the big-endian Adler-32 of
//! those exact bytes.
//!
//! This crate is pure: it converts between [`KvsMap`](pkv_types::KvsMap)
//! and `serde_json::Value`, and computes/verifies integrity tags. All file
//! handling lives in `pkv-store`.

pub mod document;
pub mod integrity;

pub use document::{decode_document, decode_value, encode_document, encode_value};
pub use integrity::{checksum, read_tag, tag_bytes, tag_matches, TAG_LEN};
