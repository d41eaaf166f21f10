//! Windowed line chunker.
//!
//! Splits file text into [`Chunk`]s of `window_lines` with `overlap_lines`
//! of overlap to preserve cross-boundary context. A cut that would land
//! inside a brace-delimited block (a function or class body, tracked by
//! scanning brace depth) is pushed to the line that closes the block, up to
//! `max_extend_lines`; past that the fixed cut applies.
//!
//! Chunk ids are SHA-256 over the source path and start line, so
//! re-chunking the same unmodified source yields byte-identical chunks and
//! ids — re-indexing upserts instead of duplicating.

use sha2::{Digest, Sha256};

use crate::catalog::CommandDescriptor;
use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkKind};

/// Split file text into overlapping line-window chunks. Returns an empty
/// vec for blank input.
pub fn chunk_file(path: &str, text: &str, modified_at: i64, cfg: &ChunkingConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < lines.len() {
        let mut end = (start + cfg.window_lines).min(lines.len());

        if end < lines.len() {
            end = extend_past_open_block(&lines, start, end, cfg.max_extend_lines);
        }

        let body = lines[start..end].join("\n");
        chunks.push(make_chunk(path, start + 1, end, &body, modified_at));

        if end >= lines.len() {
            break;
        }
        let next = end.saturating_sub(cfg.overlap_lines);
        start = if next > start { next } else { end };
    }

    chunks
}

/// One chunk per command; the text is what gets embedded and matched
/// against user turns.
pub fn chunk_command(descriptor: &CommandDescriptor) -> Chunk {
    let source_ref = format!("command:{}", descriptor.name);
    let text = format!("{}: {}", descriptor.name, descriptor.description);

    Chunk {
        id: hash_id(&source_ref, 0),
        source_ref,
        text,
        kind: ChunkKind::Command,
        modified_at: 0,
    }
}

/// If the cut line sits inside an open brace block, move it to the line
/// where depth returns to zero. Depth is tracked from the window start, so
/// the heuristic is local and deterministic regardless of what precedes
/// the window.
fn extend_past_open_block(lines: &[&str], start: usize, cut: usize, max_extend: usize) -> usize {
    let mut depth: i64 = 0;
    for line in &lines[start..cut] {
        depth += brace_delta(line);
    }
    if depth <= 0 {
        return cut;
    }

    let limit = (cut + max_extend).min(lines.len());
    let mut end = cut;
    while end < limit {
        depth += brace_delta(lines[end]);
        end += 1;
        if depth <= 0 {
            return end;
        }
    }

    // Block is longer than the allowed extension; fall back to the fixed cut.
    cut
}

fn brace_delta(line: &str) -> i64 {
    let mut delta = 0i64;
    for c in line.chars() {
        match c {
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn make_chunk(path: &str, start_line: usize, end_line: usize, text: &str, modified_at: i64) -> Chunk {
    Chunk {
        id: hash_id(path, start_line),
        source_ref: format!("{}:{}-{}", path, start_line, end_line),
        text: text.to_string(),
        kind: ChunkKind::Content,
        modified_at,
    }
}

fn hash_id(source: &str, offset: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(offset.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of chunk text, used by the indexer's change detection. Content
/// hashing, never embedding equality, decides whether a chunk is stale.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(window: usize, overlap: usize, extend: usize) -> ChunkingConfig {
        ChunkingConfig {
            window_lines: window,
            overlap_lines: overlap,
            max_extend_lines: extend,
        }
    }

    fn numbered_lines(n: usize) -> String {
        (0..n).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_file("notes.md", "alpha\nbeta", 0, &cfg(60, 10, 40));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source_ref, "notes.md:1-2");
        assert_eq!(chunks[0].text, "alpha\nbeta");
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(chunk_file("notes.md", "   \n\n", 0, &cfg(60, 10, 40)).is_empty());
    }

    #[test]
    fn test_windows_overlap() {
        let text = numbered_lines(25);
        let chunks = chunk_file("a.txt", &text, 0, &cfg(10, 3, 0));
        assert!(chunks.len() > 1);
        // Each window restarts `overlap` lines before the previous cut.
        assert!(chunks[0].text.ends_with("line 9"));
        assert!(chunks[1].text.starts_with("line 7"));
    }

    #[test]
    fn test_deterministic_ids_and_text() {
        let text = numbered_lines(100);
        let a = chunk_file("src/lib.rs", &text, 7, &cfg(30, 5, 10));
        let b = chunk_file("src/lib.rs", &text, 7, &cfg(30, 5, 10));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.text, y.text);
            assert_eq!(x.source_ref, y.source_ref);
        }
    }

    #[test]
    fn test_ids_differ_by_offset() {
        let text = numbered_lines(40);
        let chunks = chunk_file("a.txt", &text, 0, &cfg(10, 0, 0));
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn test_open_block_extends_window() {
        // fn body opens on line 3 and closes on line 8; a window of 4 would
        // cut inside it.
        let text = "a\nb\nfn demo() {\n  one\n  two\n  three\n  four\n}\ntail";
        let chunks = chunk_file("x.rs", text, 0, &cfg(4, 0, 10));
        assert!(chunks[0].text.ends_with("}"), "chunk: {:?}", chunks[0].text);
    }

    #[test]
    fn test_oversized_block_falls_back_to_fixed_cut() {
        let mut text = String::from("fn huge() {\n");
        for i in 0..50 {
            text.push_str(&format!("  stmt {};\n", i));
        }
        text.push('}');
        let chunks = chunk_file("x.rs", &text, 0, &cfg(5, 0, 3));
        // Extension limit is 3 lines, nowhere near the close; hard cut at 5.
        assert_eq!(chunks[0].source_ref, "x.rs:1-5");
    }

    #[test]
    fn test_command_chunk_text_format() {
        let descriptor = CommandDescriptor {
            name: "retry".to_string(),
            description: "regenerate the last response".to_string(),
            handler_ref: "builtin.retry".to_string(),
        };
        let chunk = chunk_command(&descriptor);
        assert_eq!(chunk.text, "retry: regenerate the last response");
        assert_eq!(chunk.source_ref, "command:retry");
        assert_eq!(chunk.kind, ChunkKind::Command);
        assert_eq!(chunk.id, chunk_command(&descriptor).id);
    }
}
