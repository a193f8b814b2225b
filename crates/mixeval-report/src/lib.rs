//! mixeval-report: renders eval reports for humans.

pub mod html;

pub use html::{generate_html, write_html_report};
