//! Recursive overlapping text chunker.
//!
//! Splits extracted page text into [`Chunk`]s of at most `max_chars`
//! characters with `overlap_chars` of shared text between consecutive chunks
//! from the same page stream. Splitting prefers natural boundaries, trying
//! paragraph breaks first and recursing into line and word breaks on
//! oversized pieces before falling back to hard character cuts.
//!
//! Each chunk receives a UUID, the source file name and page number of the
//! page it was cut from, plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document};

/// Separator cascade, largest semantic unit first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Split a document's pages into chunks. Chunk indices are contiguous
/// across the whole document, starting at 0. Deterministic for a given
/// input and size/overlap parameters; never produces an empty chunk.
pub fn split_document(doc: &Document, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;

    for page in &doc.pages {
        for window in split_text(&page.text, max_chars, overlap_chars) {
            chunks.push(make_chunk(
                &doc.file_name,
                page.number,
                chunk_index,
                &window,
            ));
            chunk_index += 1;
        }
    }

    chunks
}

/// Split one page's text into windows of at most `max_chars` characters.
pub fn split_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    // Hard cuts use a reduced stride so the merge step can always seed the
    // next window with a non-empty overlap tail.
    let stride = (max_chars - overlap_chars).max(1);
    let mut fragments = Vec::new();
    collect_fragments(text, &SEPARATORS, max_chars, stride, &mut fragments);
    merge_fragments(fragments, max_chars, overlap_chars)
}

/// Recursively break `text` into fragments no longer than `max_chars`,
/// trying the largest separator first. Fragments keep their trailing
/// separator so merging is plain concatenation.
fn collect_fragments(
    text: &str,
    separators: &[&str],
    max_chars: usize,
    stride: usize,
    out: &mut Vec<String>,
) {
    if text.chars().count() <= max_chars {
        if !text.is_empty() {
            out.push(text.to_string());
        }
        return;
    }

    match separators.first() {
        Some(sep) => {
            for piece in split_inclusive(text, sep) {
                if piece.chars().count() <= max_chars {
                    out.push(piece.to_string());
                } else {
                    collect_fragments(piece, &separators[1..], max_chars, stride, out);
                }
            }
        }
        None => hard_cut(text, stride, out),
    }
}

/// Split on `sep`, keeping the separator attached to the preceding piece.
fn split_inclusive<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, matched) in text.match_indices(sep) {
        let end = idx + matched.len();
        pieces.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Last-resort cut at fixed character counts (char-boundary safe).
fn hard_cut(text: &str, stride: usize, out: &mut Vec<String>) {
    let mut buf = String::new();
    let mut count = 0;
    for ch in text.chars() {
        buf.push(ch);
        count += 1;
        if count == stride {
            out.push(std::mem::take(&mut buf));
            count = 0;
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }
}

/// Pack fragments into windows of at most `max_chars` characters. When a
/// window fills up, the next one is seeded with the tail of the previous
/// window so no semantic unit is fully lost at a boundary.
fn merge_fragments(fragments: Vec<String>, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let stride = (max_chars - overlap_chars).max(1);

    // A fragment longer than the stride would squeeze the overlap seed out
    // of its window; re-cut such fragments so the seed always fits and
    // consecutive windows always share text.
    let mut pieces = Vec::new();
    for frag in fragments {
        if overlap_chars > 0 && frag.chars().count() > stride {
            hard_cut(&frag, stride, &mut pieces);
        } else {
            pieces.push(frag);
        }
    }

    let mut windows = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for frag in pieces {
        let frag_chars = frag.chars().count();
        if buf_chars > 0 && buf_chars + frag_chars > max_chars {
            push_window(&mut windows, &buf);
            buf = char_tail(&buf, overlap_chars);
            buf_chars = buf.chars().count();
        }
        buf.push_str(&frag);
        buf_chars += frag_chars;
    }

    if buf_chars > 0 {
        push_window(&mut windows, &buf);
    }

    windows
}

fn push_window(windows: &mut Vec<String>, buf: &str) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        windows.push(trimmed.to_string());
    }
}

/// Last `count` characters of `text`.
fn char_tail(text: &str, count: usize) -> String {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(count)).collect()
}

fn make_chunk(source: &str, page: usize, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        text: text.to_string(),
        source: source.to_string(),
        page,
        chunk_index: index,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Page;

    fn doc(pages: Vec<(usize, &str)>) -> Document {
        Document {
            file_name: "report.pdf".to_string(),
            pages: pages
                .into_iter()
                .map(|(number, text)| Page {
                    number,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    /// Length of the common region between the end of `a` and the start of `b`.
    fn overlap_len(a: &str, b: &str) -> usize {
        let max = a.len().min(b.len());
        (1..=max)
            .rev()
            .find(|&n| a.is_char_boundary(a.len() - n) && b.is_char_boundary(n) && a[a.len() - n..] == b[..n])
            .unwrap_or(0)
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = split_document(&doc(vec![(0, "Hello, world!")]), 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].page, 0);
        assert_eq!(chunks[0].source, "report.pdf");
    }

    #[test]
    fn empty_pages_produce_no_chunks() {
        let chunks = split_document(&doc(vec![(0, ""), (1, "   \n  "), (2, "real text")]), 100, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, 2);
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
    }

    #[test]
    fn no_chunk_exceeds_max_chars() {
        let words: String = (0..400).map(|i| format!("word{} ", i)).collect();
        let chunks = split_document(&doc(vec![(0, &words)]), 120, 30);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(
                c.text.chars().count() <= 120,
                "chunk of {} chars exceeds max",
                c.text.chars().count()
            );
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let words: String = (0..400).map(|i| format!("word{} ", i)).collect();
        let chunks = split_document(&doc(vec![(0, &words)]), 120, 30);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(
                overlap_len(&pair[0].text, &pair[1].text) > 0,
                "no overlap between {:?} and {:?}",
                pair[0].text,
                pair[1].text
            );
        }
    }

    #[test]
    fn full_width_line_still_overlaps_its_neighbors() {
        // A line exactly max_chars long would otherwise leave no room for
        // the overlap seed and break the chain of shared regions.
        let windows = split_text("aaaa\nbbbbbbbbb\ncccc", 10, 3);
        assert!(windows.len() > 1);
        for w in &windows {
            assert!(w.chars().count() <= 10);
        }
        for pair in windows.windows(2) {
            assert!(
                overlap_len(&pair[0], &pair[1]) > 0,
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn paragraphs_are_not_split_when_they_fit() {
        let text = (0..20)
            .map(|i| format!("Paragraph number {} body.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_document(&doc(vec![(0, &text)]), 60, 0);
        for i in 0..20 {
            let needle = format!("Paragraph number {} body.", i);
            let holders = chunks.iter().filter(|c| c.text.contains(&needle)).count();
            assert_eq!(holders, 1, "paragraph {} split across chunks", i);
        }
    }

    #[test]
    fn unbroken_run_is_hard_cut() {
        let run = "x".repeat(500);
        let chunks = split_document(&doc(vec![(0, &run)]), 100, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 100);
        }
    }

    #[test]
    fn chunk_indices_contiguous_across_pages() {
        let long: String = (0..100).map(|i| format!("word{} ", i)).collect();
        let chunks = split_document(&doc(vec![(0, &long), (1, &long)]), 80, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
        assert!(chunks.iter().any(|c| c.page == 0));
        assert!(chunks.iter().any(|c| c.page == 1));
    }

    #[test]
    fn deterministic_for_same_input() {
        let text = "Alpha beta gamma delta.\n\nEpsilon zeta eta theta.\n\nIota kappa.";
        let a = split_document(&doc(vec![(0, text)]), 30, 8);
        let b = split_document(&doc(vec![(0, text)]), 30, 8);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.page, y.page);
        }
    }

    #[test]
    fn multibyte_text_is_cut_at_char_boundaries() {
        let run = "é".repeat(300);
        let chunks = split_document(&doc(vec![(0, &run)]), 100, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 100);
        }
    }
}
