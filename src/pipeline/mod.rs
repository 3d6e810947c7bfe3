//! Pipeline stages that turn a statement PDF into parsed table rows.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ (request) ──▶ table
//! (path/URL)  (pdfium)  (PNG/base64)  (client)    (pipe-table parser)
//! ```
//!
//! 1. [`input`]: read a local file or download a URL into memory
//! 2. [`render`]: rasterise the selected pages; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode and base64-wrap page bitmaps
//! 4. [`table`]: parse the model's pipe-delimited reply into records
//!
//! The request itself lives in [`crate::prompts`] and [`crate::client`].

pub mod encode;
pub mod input;
pub mod render;
pub mod table;
