use crate::document::DocumentChunk;

pub struct Prompt;

impl Prompt {
    pub const SYSTEM_INSTRUCTION: &'static str = "You are a helpful assistant that answers questions \
based on the provided document context. Always cite your sources and be specific about which \
documents you're referencing. If the context doesn't contain enough information to answer the \
question, say so clearly.";

    pub const CONTEXT_SEPARATOR: &'static str = "\n\n---\n\n";

    pub const USER_PROMPT: &'static str = "Context from documents:\n{}\n\nQuestion: {}\n\n\
Please provide a comprehensive answer based on the context above. Include specific references \
to the source documents.";

    /// Renders each chunk under a source header, most relevant first.
    pub fn build_context(chunks: &[DocumentChunk]) -> String {
        chunks
            .iter()
            .map(|chunk| {
                format!(
                    "[Source: {}, Section: {}]\n{}",
                    chunk.metadata.source, chunk.metadata.section, chunk.content
                )
            })
            .collect::<Vec<_>>()
            .join(Self::CONTEXT_SEPARATOR)
    }

    pub fn build_prompt(context: &str, query: &str) -> String {
        // Context goes in first so a "{}" inside it is never substituted.
        match Self::USER_PROMPT.split_once("{}") {
            Some((head, tail)) => {
                format!("{}{}{}", head, context, tail.replacen("{}", query, 1))
            }
            None => Self::USER_PROMPT.to_string(),
        }
    }

    /// The context block of a prompt produced by `build_prompt`.
    pub fn context_of(prompt: &str) -> Option<&str> {
        let (head, tail) = Self::USER_PROMPT.split_once("{}")?;
        let after = tail.split_once("{}").map_or(tail, |(before, _)| before);
        let rest = prompt.strip_prefix(head)?;
        if after.is_empty() {
            return Some(rest);
        }
        rest.rfind(after).map(|end| &rest[..end])
    }
}
