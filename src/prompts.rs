//! Prompts and request assembly for statement extraction.
//!
//! The instruction is fixed: the only per-document input is the set of page
//! images. Which pages to send is decided by
//! [`crate::config::PageSelection`] before this point, so the prompt carries
//! no knowledge of a particular statement's layout.

use crate::config::ExtractionConfig;
use crate::pipeline::encode::{to_base64, PNG_MEDIA_TYPE};
use crate::pipeline::render::PageImage;
use serde::{Deserialize, Serialize};

/// Default system prompt.
pub const SYSTEM_PROMPT: &str = "You are a PDF bank statement analyzer.";

/// Instruction block sent with every statement.
pub const EXTRACTION_PROMPT: &str = r#"I'll give you pages of a bank statement as images. Read every transaction on them and give me back a table with the following information:

Date, Concept (only the text after the word "CONCEPTO") and Amount (MXN), Type.

Example, in the description:
PAGO TRANSFERENCIA SPEI HORA 09:44:38
ENVIADO A AZTECA
A LA CUENTA 127180001128564631
AL CLIENTE ANDRES CAZAREZ DIAZ (1)
(1) DATO NO VERIFICADO POR ESTA INSTITUCION
CLAVE DE RASTREO 2024110140014BMOV0000476736050
REF 3903381
CONCEPTO RENTA DEPTO CHAPULTEPEC

you will give as Concept only: RENTA DEPTO CHAPULTEPEC

Type says whether the transaction is Income or Expense.

Return the data ONLY in a table format with columns:
| Date | Concept | Amount (MXN) | Type |"#;

/// One base64 image attached to the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePart {
    pub media_type: String,
    /// Standard base64 of the encoded image.
    pub data: String,
}

/// Everything sent to the extraction service for one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub model: String,
    pub system: String,
    pub instruction: String,
    /// Page images in document order.
    pub images: Vec<ImagePart>,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Build the request for a set of rendered pages.
pub fn build_request(pages: &[PageImage], config: &ExtractionConfig) -> ExtractionRequest {
    let images = pages
        .iter()
        .map(|p| ImagePart {
            media_type: PNG_MEDIA_TYPE.to_string(),
            data: to_base64(&p.png),
        })
        .collect();

    ExtractionRequest {
        model: config.model.clone(),
        system: config
            .system_prompt
            .clone()
            .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
        instruction: EXTRACTION_PROMPT.to_string(),
        images,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}
