//! Output formatting for the final run report

pub mod json;
pub mod text;
