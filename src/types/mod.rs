//! Core types for the document processing service

pub mod document;
pub mod financial;

pub use document::DocumentRecord;
pub use financial::{FinancialData, LineItem, ParsedFinancialDocument};
