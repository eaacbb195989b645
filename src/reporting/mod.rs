//! Rendering of accumulated failures

pub mod report_writer;
