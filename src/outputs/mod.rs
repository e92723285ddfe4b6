//! Output generation for the pipeline's JSON artifacts and Markdown digest.
//!
//! # Submodules
//!
//! - [`json`]: Reads and writes stage artifacts and model debug dumps
//! - [`markdown`]: Writes the final digest and renders a local fallback
//!
//! # Output Structure
//!
//! ```text
//! outputs/
//! ├── raw_stories_2025-11-03_to_2025-11-10_COMPLETE.json
//! ├── ranked_stories_2025-11-03_to_2025-11-10.json
//! ├── debug_dedup_response.txt
//! ├── debug_dedup_json.txt
//! └── newsletter_2025-11-03_to_2025-11-10.md
//! ```

pub mod json;
pub mod markdown;
