//! Structured financial data extracted from parsed documents

use serde::{Deserialize, Serialize};

/// Output of a financial parser run over one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFinancialDocument {
    /// Correlation ID assigned by the external parsing service, if any
    pub llamaparse_job_id: Option<String>,
    /// Raw parsed content (markdown)
    pub parsed_content: String,
    /// Structured data recovered from the content; `None` when nothing usable
    /// was found
    pub extracted_data: Option<FinancialData>,
}

/// Structured financial metadata for an invoice, receipt, or bill
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialData {
    /// invoice, receipt, estimate, bill
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    /// Issue date as found in the document (ISO or as-printed)
    pub issue_date: Option<String>,
    pub vendor_name: Option<String>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub project_name: Option<String>,
    pub line_items: Vec<LineItem>,
}

/// A single product/service line on a financial document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    /// materials, labor, equipment, supplies, other
    pub category: Option<String>,
}
