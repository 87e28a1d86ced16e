//! Prompt assembly for grounded question answering

use crate::retrieval::RetrievedMatch;
use crate::types::ContextEntry;

/// Grounding instruction prefixed to every prompt
const GROUNDING_INSTRUCTION: &str = "You are an assistant that answers questions \
about a PDF document. Answer using only the provided context. Cite sources as \
[1], [2], etc., referring to the numbered fragments below. If the context is \
not sufficient to answer, say so explicitly.";

/// The assembled prompt and the numbered entries it references
///
/// `entries` is the only place citation numbers are minted: position `i` in
/// the retrieval ranking gets `citation_number = i + 1`, and that is what a
/// `[n]` marker in the generated answer refers to. The chunk's storage
/// position (`chunk_index`) appears in the prompt for display only.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Full prompt handed to the generator
    pub prompt: String,
    /// Context entries in citation-number order
    pub entries: Vec<ContextEntry>,
}

/// Prompt builder for retrieval-grounded queries
pub struct ContextAssembler;

impl ContextAssembler {
    /// Assemble the generation prompt from ranked matches
    ///
    /// Zero matches still yields a well-formed prompt with an empty context
    /// section; the model is expected to state that context is insufficient.
    pub fn assemble(question: &str, matches: &[RetrievedMatch]) -> AssembledContext {
        let entries: Vec<ContextEntry> = matches
            .iter()
            .enumerate()
            .map(|(i, m)| ContextEntry {
                citation_number: i + 1,
                chunk_id: m.chunk_id,
                chunk_index: m.chunk_index,
                content: m.content.clone(),
            })
            .collect();

        let context = entries
            .iter()
            .map(|entry| {
                format!(
                    "[{}] (fragment {}):\n{}",
                    entry.citation_number, entry.chunk_index, entry.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "{instruction}\n\nDocument context:\n{context}\n\nQuestion: {question}",
            instruction = GROUNDING_INSTRUCTION,
            context = context,
            question = question
        );

        AssembledContext { prompt, entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn matched(index: u32, content: &str) -> RetrievedMatch {
        RetrievedMatch {
            chunk_id: Uuid::new_v4(),
            chunk_index: index,
            content: content.to_string(),
            similarity: 0.9,
        }
    }

    #[test]
    fn citation_numbers_follow_rank_not_chunk_index() {
        let matches = vec![matched(7, "seventh"), matched(2, "second")];
        let assembled = ContextAssembler::assemble("q", &matches);

        assert_eq!(assembled.entries[0].citation_number, 1);
        assert_eq!(assembled.entries[0].chunk_index, 7);
        assert_eq!(assembled.entries[1].citation_number, 2);
        assert_eq!(assembled.entries[1].chunk_index, 2);
    }

    #[test]
    fn prompt_contains_numbered_blocks_and_question() {
        let matches = vec![matched(0, "alpha"), matched(1, "beta")];
        let assembled = ContextAssembler::assemble("what is alpha?", &matches);

        assert!(assembled.prompt.contains("[1] (fragment 0):\nalpha"));
        assert!(assembled.prompt.contains("[2] (fragment 1):\nbeta"));
        assert!(assembled.prompt.contains("Question: what is alpha?"));
    }

    #[test]
    fn zero_matches_still_yields_well_formed_prompt() {
        let assembled = ContextAssembler::assemble("anything?", &[]);

        assert!(assembled.entries.is_empty());
        assert!(assembled.prompt.contains("Question: anything?"));
        assert!(assembled.prompt.contains("not sufficient"));
    }

    #[test]
    fn entry_content_is_the_full_chunk() {
        let long = "x".repeat(2000);
        let matches = vec![matched(0, &long)];
        let assembled = ContextAssembler::assemble("q", &matches);
        assert_eq!(assembled.entries[0].content.len(), 2000);
    }
}
