use recon_core::Document;

/// Recursive character splitter (spec §4.2): optional, parameterised by
/// `chunk_size` and `chunk_overlap` (both non-negative, `overlap < size`).
/// When disabled, each Document passes through the Chunker unchanged.
///
/// Operates on `char` boundaries rather than bytes so multi-byte UTF-8
/// sequences are never split mid-codepoint — the same boundary-safety
/// concern the teacher's token splitter handles explicitly.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl RecursiveCharacterTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, String> {
        if chunk_overlap >= chunk_size {
            return Err(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: vec!["\n\n", "\n", " ", ""],
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let (separator, next_separators) = pick_separator(text, separators);
        let splits = split_by_separator(text, separator);

        let mut good_splits: Vec<String> = Vec::new();
        let mut final_chunks: Vec<String> = Vec::new();

        for split in splits {
            if char_len(&split) < self.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits, separator));
                good_splits.clear();
            }

            if next_separators.is_empty() {
                final_chunks.push(split);
            } else {
                final_chunks.extend(self.split_recursive(&split, next_separators));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits, separator));
        }

        final_chunks
    }

    /// Slide a window of `splits` into chunks no larger than `chunk_size`,
    /// carrying `chunk_overlap` characters of trailing context into the next
    /// chunk.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;

        for split in splits {
            let split_len = char_len(split);
            let added_len = if current.is_empty() { split_len } else { split_len + sep_len };

            if current_len + added_len > self.chunk_size && !current.is_empty() {
                docs.push(current.join(separator));

                while current_len > self.chunk_overlap && current.len() > 1 {
                    let popped = current.remove(0);
                    current_len -= char_len(&popped) + sep_len;
                }
            }

            current.push(split.clone());
            current_len += if current.len() == 1 { split_len } else { added_len };
        }

        if !current.is_empty() {
            docs.push(current.join(separator));
        }

        docs.retain(|chunk| !chunk.trim().is_empty());
        docs
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [&'static str]) -> (&'static str, &'a [&'static str]) {
    for (index, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator) {
            return (separator, &separators[index + 1..]);
        }
    }
    let last = separators.last().copied().unwrap_or("");
    (last, &[])
}

fn split_by_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator).map(String::from).collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Apply the chunker to a Document, preserving parent metadata on every
/// produced sub-Document (spec §4.2). `None` disables chunking: the
/// Document passes through unchanged.
pub fn chunk_document(
    document: &Document,
    splitter: Option<&RecursiveCharacterTextSplitter>,
) -> Vec<Document> {
    let Some(splitter) = splitter else {
        return vec![document.clone()];
    };

    splitter
        .split_text(&document.page_content)
        .into_iter()
        .map(|text| Document::new(text, document.metadata.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::MetadataMap;

    #[test]
    fn given_overlap_not_smaller_than_size_when_constructing_then_errors() {
        assert!(RecursiveCharacterTextSplitter::new(10, 10).is_err());
        assert!(RecursiveCharacterTextSplitter::new(10, 11).is_err());
    }

    #[test]
    fn given_short_text_when_splitting_then_returns_single_chunk() {
        let splitter = RecursiveCharacterTextSplitter::new(100, 10).unwrap();
        let chunks = splitter.split_text("a short paragraph");
        assert_eq!(chunks, vec!["a short paragraph".to_string()]);
    }

    #[test]
    fn given_long_text_when_splitting_then_no_chunk_exceeds_chunk_size() {
        let splitter = RecursiveCharacterTextSplitter::new(20, 5).unwrap();
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = splitter.split_text(text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn given_long_text_when_splitting_then_reassembled_content_covers_original_words() {
        let splitter = RecursiveCharacterTextSplitter::new(15, 5).unwrap();
        let text = "one two three four five six seven eight nine ten";
        let chunks = splitter.split_text(text);
        let merged: String = chunks.join(" ");
        for word in text.split_whitespace() {
            assert!(merged.contains(word), "missing word {word}");
        }
    }

    #[test]
    fn given_no_splitter_when_chunking_document_then_document_passes_through_unchanged() {
        let doc = Document::new("unchanged text", MetadataMap::new());
        let chunks = chunk_document(&doc, None);
        assert_eq!(chunks, vec![doc]);
    }

    #[test]
    fn given_splitter_when_chunking_document_then_parent_metadata_is_preserved_on_every_chunk() {
        let mut metadata = MetadataMap::new();
        metadata.insert("item_id".into(), "abc".into());
        let doc = Document::new(
            "alpha beta gamma delta epsilon zeta eta theta iota kappa",
            metadata,
        );
        let splitter = RecursiveCharacterTextSplitter::new(20, 5).unwrap();

        let chunks = chunk_document(&doc, Some(&splitter));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.get("item_id").unwrap().stringify(), "abc");
        }
    }

    #[test]
    fn given_utf8_multibyte_text_when_splitting_then_chunks_remain_valid_utf8() {
        let splitter = RecursiveCharacterTextSplitter::new(5, 1).unwrap();
        let text = "한글 테스트 문장 입니다";
        let chunks = splitter.split_text(text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
    }
}
