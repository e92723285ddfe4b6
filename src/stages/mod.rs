//! Pipeline stages, each producing the artifact the next one reads.
//!
//! | Stage | Module | Input | Output |
//! |-------|--------|-------|--------|
//! | Extract | [`extract`] | Gmail search window | `raw_stories_*_COMPLETE.json` |
//! | Rank | [`rank`] | raw stories | `ranked_stories_*.json` |
//! | Format | [`format`] | ranked stories | Markdown digest |

pub mod extract;
pub mod format;
pub mod rank;
