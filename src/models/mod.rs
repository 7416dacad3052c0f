//! Data models for uploaded files and the JSON bodies built from them.
//!
//! Stored object bytes and metadata live in the bucket; these types only
//! describe what flows through the HTTP surface.

pub mod file;
