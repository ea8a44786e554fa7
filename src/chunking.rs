// chunking.rs
//! Splitting extracted document text into retrievable chunks.
//!
//! CSV content yields one chunk per data row, each prefixed by the header row.
//! Everything else is whitespace-normalised and cut into overlapping windows.

use crate::config::ChunkingConfig;
use crate::document::DocumentChunk;
use crate::error::RagError;

/// Splits `content` into chunks according to its file type.
///
/// # Arguments
/// * `content` - Plain text, already extracted by the caller.
/// * `file_type` - MIME type or extension; anything mentioning "csv" is split by rows.
/// * `filename` - Recorded as the chunk source and used to build chunk ids.
/// * `config` - Window size, overlap and minimum content length.
///
/// # Returns
/// * `Ok(chunks)` with at least one chunk.
/// * `Err(RagError::EmptyDocument)` for content shorter than the minimum or yielding no chunk.
/// * `Err(RagError::UnsupportedOrMalformedContent)` for binary content or a CSV without data rows.
pub fn chunk_document(
    content: &str,
    file_type: &str,
    filename: &str,
    config: &ChunkingConfig,
) -> Result<Vec<DocumentChunk>, RagError> {
    if content.trim().chars().count() < config.min_content_length {
        return Err(RagError::EmptyDocument);
    }
    if content.contains('\0') {
        return Err(RagError::UnsupportedOrMalformedContent(format!(
            "{} contains binary data; extract its text first",
            filename
        )));
    }

    let chunks = if file_type.to_ascii_lowercase().contains("csv") {
        chunk_csv(content, filename)?
    } else {
        chunk_text(content, filename, config)
    };

    if chunks.is_empty() {
        return Err(RagError::EmptyDocument);
    }
    Ok(chunks)
}

fn chunk_csv(content: &str, filename: &str) -> Result<Vec<DocumentChunk>, RagError> {
    let lines: Vec<&str> = content
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect();

    let Some((header, rows)) = lines.split_first() else {
        return Err(RagError::UnsupportedOrMalformedContent(
            "CSV file appears to be empty or invalid".into(),
        ));
    };
    if rows.is_empty() {
        return Err(RagError::UnsupportedOrMalformedContent(
            "CSV file appears to be empty or invalid".into(),
        ));
    }

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let row_number = i + 1;
            DocumentChunk::new(
                format!("{}_row_{}", filename, row_number),
                format!("{}\n{}", header, row),
                filename,
                format!("Row {}", row_number),
            )
        })
        .collect())
}

/// Collapses every whitespace run into a single space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn chunk_text(content: &str, filename: &str, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    let text: Vec<char> = normalize_whitespace(content).chars().collect();
    if text.is_empty() {
        return Vec::new();
    }

    if text.len() < config.chunk_size {
        return vec![DocumentChunk::new(
            format!("{}_chunk_0", filename),
            text.into_iter().collect(),
            filename,
            "Full Document".to_string(),
        )];
    }

    // Consecutive windows share exactly `overlap` characters; the last window
    // ends at the end of the text.
    let step = config.chunk_size - config.overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(text.len());
        let index = chunks.len();
        chunks.push(DocumentChunk::new(
            format!("{}_chunk_{}", filename, index),
            text[start..end].iter().collect(),
            filename,
            format!("Chunk {}", index + 1),
        ));
        if end == text.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap,
            min_content_length: 10,
        }
    }

    #[test]
    fn test_short_text_is_one_full_document_chunk() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let chunks = chunk_document(text, "text/plain", "fox.txt", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].metadata.section, "Full Document");
        assert_eq!(chunks[0].metadata.source, "fox.txt");
        assert_eq!(chunks[0].id, "fox.txt_chunk_0");
        assert!(chunks[0].embedding.is_none());
    }

    #[test]
    fn test_csv_rows_carry_header() {
        let chunks = chunk_document(
            "name,age\nAlice,30\nBob,25",
            "text/csv",
            "people.csv",
            &ChunkingConfig::default(),
        )
        .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "name,age\nAlice,30");
        assert_eq!(chunks[0].metadata.section, "Row 1");
        assert_eq!(chunks[1].content, "name,age\nBob,25");
        assert_eq!(chunks[1].metadata.section, "Row 2");
        assert_eq!(chunks[1].id, "people.csv_row_2");
    }

    #[test]
    fn test_csv_handles_crlf_and_blank_lines() {
        let chunks = chunk_document(
            "id,city\r\n1,Paris\r\n\r\n2,Lyon\r\n",
            "csv",
            "cities.csv",
            &ChunkingConfig::default(),
        )
        .unwrap();
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["id,city\n1,Paris", "id,city\n2,Lyon"]);
    }

    #[test]
    fn test_csv_without_rows_is_malformed() {
        let err = chunk_document("just,a,header", "text/csv", "h.csv", &ChunkingConfig::default())
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedOrMalformedContent(_)));
    }

    #[test]
    fn test_too_short_is_empty() {
        let err = chunk_document("   tiny \n ", "text/plain", "t.txt", &ChunkingConfig::default())
            .unwrap_err();
        assert_eq!(err, RagError::EmptyDocument);
    }

    #[test]
    fn test_binary_content_is_rejected() {
        let err = chunk_document("PK\0\0binary stuff here", "application/zip", "a.zip", &ChunkingConfig::default())
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedOrMalformedContent(_)));
    }

    #[test]
    fn test_windows_overlap_and_are_labelled() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_document(text, "text/plain", "abc.txt", &config(10, 3)).unwrap();
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);
        assert_eq!(chunks[0].metadata.section, "Chunk 1");
        assert_eq!(chunks[3].metadata.section, "Chunk 4");
        assert_eq!(chunks[3].id, "abc.txt_chunk_3");
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        assert_eq!(normalize_whitespace("  a \n\n b\t\tc  "), "a b c");
    }

    #[test]
    fn test_multibyte_text_is_cut_on_char_boundaries() {
        let text = "é".repeat(25);
        let chunks = chunk_document(&text, "text/plain", "e.txt", &config(10, 2)).unwrap();
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 10));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        /// Dropping the overlap from every window after the first rebuilds the normalised text.
        #[test]
        fn prop_windows_reconstruct_text(
            text in "[a-z]{10}[a-z \n\t]{0,600}",
            chunk_size in 2usize..120,
            overlap_seed in 0usize..1000,
        ) {
            let overlap = overlap_seed % chunk_size;
            let chunks = chunk_document(&text, "text/plain", "p.txt", &config(chunk_size, overlap)).unwrap();
            let normalized = normalize_whitespace(&text);

            let mut rebuilt = String::new();
            for (i, chunk) in chunks.iter().enumerate() {
                let skip = if i == 0 { 0 } else { overlap };
                rebuilt.extend(chunk.content.chars().skip(skip));
            }
            prop_assert_eq!(rebuilt, normalized);
            prop_assert!(!chunks.last().unwrap().content.is_empty());
        }

        /// A CSV with N data rows yields N chunks of header plus one row.
        #[test]
        fn prop_csv_one_chunk_per_row(
            header in "[a-z]{3,8}(,[a-z]{3,8}){0,3}",
            rows in prop::collection::vec("[A-Za-z0-9]{1,6}(,[A-Za-z0-9]{1,6}){0,3}", 1..30),
        ) {
            let content = format!("{}\n{}", header, rows.join("\n"));
            let config = ChunkingConfig { min_content_length: 1, ..ChunkingConfig::default() };
            let chunks = chunk_document(&content, "text/csv", "d.csv", &config).unwrap();
            prop_assert_eq!(chunks.len(), rows.len());
            for (i, (chunk, row)) in chunks.iter().zip(rows.iter()).enumerate() {
                prop_assert_eq!(&chunk.content, &format!("{}\n{}", header, row));
                prop_assert_eq!(&chunk.metadata.section, &format!("Row {}", i + 1));
            }
        }
    }
}
