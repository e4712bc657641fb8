//! Financial document parsing via the LlamaParse cloud API
//!
//! Uploads the document, polls the parsing job until it settles, fetches the
//! markdown result, and recovers structured financial fields from it with
//! pattern matching.

use async_trait::async_trait;
use regex::RegexBuilder;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::types::{DocumentRecord, FinancialData, ParsedFinancialDocument};

/// Extracts structured financial data from a document
///
/// Errors from this collaborator are soft: the pipeline logs them and
/// continues without extracted data.
#[async_trait]
pub trait FinancialParser: Send + Sync {
    async fn parse(&self, document: &DocumentRecord) -> Result<ParsedFinancialDocument>;

    /// Provider name for diagnostics
    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MarkdownResponse {
    markdown: String,
}

/// LlamaParse HTTP client
pub struct LlamaParseClient {
    client: Client,
    config: ParserConfig,
    api_key: String,
}

impl LlamaParseClient {
    /// Create a new client; requires an API key
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            Error::Config("LLAMA_CLOUD_API_KEY is required for LlamaParse".to_string())
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Upload a document for parsing; returns the service's job ID
    async fn upload(&self, document: &DocumentRecord) -> Result<String> {
        let data = tokio::fs::read(&document.file_path).await.map_err(|e| {
            Error::parser(format!("Failed to read {}: {}", document.file_path, e))
        })?;

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(data)
                .file_name(document.filename.clone())
                .mime_str(&document.content_type)
                .map_err(|e| Error::parser(format!("Invalid content type: {}", e)))?,
        );

        let response = self
            .client
            .post(format!("{}/api/parsing/upload", self.config.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::parser(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::parser(format!(
                "Upload rejected: {} - {}",
                status, body
            )));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::parser(format!("Invalid upload response: {}", e)))?;

        Ok(upload.id)
    }

    /// Poll the parsing job until it succeeds, fails, or polling is exhausted
    async fn wait_for_result(&self, parser_job_id: &str) -> Result<String> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        for _ in 0..self.config.max_poll_attempts {
            let response = self
                .client
                .get(format!(
                    "{}/api/parsing/job/{}",
                    self.config.base_url, parser_job_id
                ))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| Error::parser(format!("Status poll failed: {}", e)))?;

            let status: JobStatusResponse = response
                .json()
                .await
                .map_err(|e| Error::parser(format!("Invalid status response: {}", e)))?;

            match status.status.as_str() {
                "SUCCESS" => return self.fetch_markdown(parser_job_id).await,
                "ERROR" | "CANCELED" => {
                    return Err(Error::parser(format!(
                        "Parsing job {} ended with status {}",
                        parser_job_id, status.status
                    )));
                }
                _ => tokio::time::sleep(interval).await,
            }
        }

        Err(Error::parser(format!(
            "Parsing job {} did not finish within {} polls",
            parser_job_id, self.config.max_poll_attempts
        )))
    }

    async fn fetch_markdown(&self, parser_job_id: &str) -> Result<String> {
        let response = self
            .client
            .get(format!(
                "{}/api/parsing/job/{}/result/markdown",
                self.config.base_url, parser_job_id
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::parser(format!("Result fetch failed: {}", e)))?;

        let result: MarkdownResponse = response
            .json()
            .await
            .map_err(|e| Error::parser(format!("Invalid result response: {}", e)))?;

        Ok(result.markdown)
    }
}

#[async_trait]
impl FinancialParser for LlamaParseClient {
    async fn parse(&self, document: &DocumentRecord) -> Result<ParsedFinancialDocument> {
        let parser_job_id = self.upload(document).await?;
        tracing::debug!(
            "LlamaParse job {} created for document {}",
            parser_job_id,
            document.id
        );

        let parsed_content = self.wait_for_result(&parser_job_id).await?;

        if parsed_content.trim().is_empty() {
            return Err(Error::parser("No content extracted from document"));
        }

        let extracted_data = extract_with_patterns(&parsed_content);

        Ok(ParsedFinancialDocument {
            llamaparse_job_id: Some(parser_job_id),
            parsed_content,
            extracted_data,
        })
    }

    fn name(&self) -> &str {
        "llamaparse"
    }
}

/// Recover structured financial fields from parsed content with regex patterns
///
/// Returns `None` when nothing recognizable was found.
pub(crate) fn extract_with_patterns(content: &str) -> Option<FinancialData> {
    let total_amount = capture(content, r"(?:total|amount due|grand total)[\s:$]*([0-9][0-9,]*\.[0-9]{2})")
        .and_then(|s| s.replace(',', "").parse::<f64>().ok());
    let document_number = capture(content, r"(?:invoice|receipt)[\s#:]*([A-Za-z]*[-]?\d+)");
    let issue_date = capture(content, r"(?:date|issued)[\s:]*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})");
    let vendor_name = capture(content, r"^([A-Z][A-Za-z\s&]+(?:LLC|Inc|Corp))\s*$")
        .map(|s| s.trim().to_string());

    if total_amount.is_none()
        && document_number.is_none()
        && issue_date.is_none()
        && vendor_name.is_none()
    {
        return None;
    }

    Some(FinancialData {
        document_type: Some("invoice".to_string()),
        document_number,
        issue_date,
        vendor_name,
        total_amount,
        currency: Some("USD".to_string()),
        project_name: None,
        line_items: Vec::new(),
    })
}

fn capture(content: &str, pattern: &str) -> Option<String> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .ok()?;
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
