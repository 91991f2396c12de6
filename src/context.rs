//! Prompt context assembly.
//!
//! Reads the original text of each ranked document (not the stored
//! chunks) and wraps it, together with the user's question, in a fixed
//! prompt template for the generation model.

use std::path::Path;

use crate::error::{RagError, Result};
use crate::models::ScoredResult;

/// Concatenate the source text of `results` in ranked order, each followed
/// by a newline.
///
/// A document that can no longer be read fails the whole assembly with
/// [`RagError::SourceUnavailable`].
pub async fn assemble_context(results: &[ScoredResult]) -> Result<String> {
    let mut context = String::new();
    for result in results {
        let path = Path::new(&result.document_id);
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| RagError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(document = %result.document_id, score = result.score, "selected for context");
        context.push_str(&text);
        context.push('\n');
    }
    Ok(context)
}

/// Fill the prompt template with retrieved context and the question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the below information provided in org-mode markdown to answer the subsequent \
         question. Do not offer any helpful advice! If the answer can not be derived from the \
         provided information, use your best take to answer the question.\n\
         Information:\n{}\n\nQuestion: {}",
        context, question
    )
}
