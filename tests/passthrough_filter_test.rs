//! Chunk-boundary and safety tests for the pass-through filter.

use hydra::PassthroughFilter;

const INNER_ROWS: u16 = 21;

fn filter_whole(input: &[u8]) -> Vec<u8> {
    let mut filter = PassthroughFilter::new(INNER_ROWS);
    let mut out = Vec::new();
    filter.filter(input, &mut out);
    out
}

fn filter_split(input: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut filter = PassthroughFilter::new(INNER_ROWS);
    let mut out = Vec::new();
    for chunk in input.chunks(chunk_size) {
        filter.filter(chunk, &mut out);
    }
    out
}

/// A realistic mixed stream: text, SGR, cursor moves, and every class
/// of sequence the filter rewrites or strips.
fn mixed_stream() -> Vec<u8> {
    let mut stream = Vec::new();
    stream.extend_from_slice(b"plain text \x1b[1;32mstyled\x1b[0m\r\n");
    stream.extend_from_slice(b"\x1b[?1049h");
    stream.extend_from_slice(b"alt body");
    stream.extend_from_slice(b"\x1b[?1049l");
    stream.extend_from_slice(b"\x1b[2;20r");
    stream.extend_from_slice(b"\x1b[>1u\x1b[<u");
    stream.extend_from_slice(b"\x1b[6n\x1b[>c");
    stream.extend_from_slice(b"\x1b[?1004h");
    stream.extend_from_slice("done ✓\r\n".as_bytes());
    stream
}

#[test]
fn alt_screen_bytes_never_reach_the_host() {
    // The host must never enter the alternate screen; only the text
    // around the toggles survives.
    assert_eq!(filter_whole(b"X\x1b[?1049hY\x1b[?1049lZ"), b"XYZ");
}

#[test]
fn filtering_is_chunk_boundary_invariant() {
    // Byte-at-a-time feeding must produce exactly the whole-stream
    // result: no partial sequence may leak across a read boundary.
    let stream = mixed_stream();
    let whole = filter_whole(&stream);
    for chunk_size in [1, 2, 3, 5, 7, 16] {
        assert_eq!(
            filter_split(&stream, chunk_size),
            whole,
            "chunk size {chunk_size}"
        );
    }
}

#[test]
fn output_contains_no_destabilizing_sequences() {
    let out = filter_whole(&mixed_stream());
    let text = String::from_utf8_lossy(&out);

    assert!(!text.contains("\x1b[?1049"), "alt-screen toggle leaked");
    assert!(!text.contains("\x1b[?1004"), "focus reporting leaked");
    assert!(!text.contains("\x1b[>1u"), "kitty push leaked");
    assert!(!text.contains("\x1b[6n"), "DSR request leaked");
    assert!(!text.contains("\x1b[>c"), "DA query leaked");
    // DECSTBM appears only re-pinned to the compositor's region.
    assert!(!text.contains("\x1b[2;20r"));
    assert!(text.contains(&format!("\x1b[1;{INNER_ROWS}r")));
}

#[test]
fn content_survives_filtering() {
    let out = filter_whole(&mixed_stream());
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("plain text"));
    assert!(text.contains("styled"));
    assert!(text.contains("alt body"));
    assert!(text.contains("done ✓"));
    // Benign styling is untouched.
    assert!(text.contains("\x1b[1;32m"));
}

#[test]
fn every_decstbm_is_within_the_region() {
    // Pass-through safety: whatever regions the stream requests, the
    // host only ever sees [1, inner_rows].
    let stream = b"\x1b[r\x1b[1;5r\x1b[3;40r\x1b[10;11rtext";
    let out = filter_whole(stream);
    let text = String::from_utf8_lossy(&out);
    let expected = format!("\x1b[1;{INNER_ROWS}r");
    let mut rest = text.as_ref();
    let mut count = 0;
    while let Some(pos) = rest.find("\x1b[") {
        let tail = &rest[pos..];
        if let Some(end) = tail.find('r') {
            assert_eq!(&tail[..=end], expected, "unexpected DECSTBM");
            count += 1;
            rest = &tail[end + 1..];
        } else {
            break;
        }
    }
    assert_eq!(count, 4);
    assert!(text.contains("text"));
}

#[test]
fn utf8_text_is_byte_exact() {
    let input = "日本語テキスト ✓ émoji 🚀".as_bytes();
    assert_eq!(filter_whole(input), input);
    assert_eq!(filter_split(input, 1), input);
}
