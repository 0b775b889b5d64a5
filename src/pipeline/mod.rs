//! Pipeline stages for report generation.
//!
//! Each submodule implements exactly one transformation step. Data flows
//! strictly downstream; no stage reads back from a later one.
//!
//! ## Data Flow
//!
//! ```text
//! links ──▶ fetch ──▶ fit ──▶ compose ──▶ render
//! (cell)   (HTTP)   (math)  (blocks)    (PDF)
//! ```
//!
//! 1. [`links`]: split a free-text CSV cell and extract provider file ids
//! 2. [`fetch`]: download each id with retry/backoff into run-scoped temp
//!    storage; the only stage with network I/O
//! 3. [`fit`]: scale intrinsic image sizes into a bounding box
//! 4. [`compose`]: build the ordered block sequence: header, sections,
//!    two-column field tables, the image grid
//! 5. [`render`]: lay the blocks out on pages and emit PDF bytes; CPU-bound,
//!    run under `spawn_blocking`

pub mod compose;
pub mod fetch;
pub mod fit;
pub mod links;
pub mod render;
