//! Newline framing for the inbound byte stream.
//!
//! Bytes are accumulated until a `\n` shows up. Every complete piece becomes a
//! line; the unterminated tail is carried over to the next read.

/// Append `new_bytes` to `accumulator` and split off every complete line.
///
/// Returns the new accumulator (never containing `\n`) and the completed lines
/// in arrival order. Lines are decoded lossily and trimmed, so a trailing `\r`
/// from CRLF devices disappears. Blank lines are kept.
pub fn push(mut accumulator: Vec<u8>, new_bytes: &[u8]) -> (Vec<u8>, Vec<String>) {
    // The accumulator never holds a newline, so only the new bytes need scanning.
    let search_from = accumulator.len();
    accumulator.extend_from_slice(new_bytes);

    let last_newline = match accumulator[search_from..].iter().rposition(|&b| b == b'\n') {
        Some(pos) => search_from + pos,
        None => return (accumulator, Vec::new()),
    };

    let rest = accumulator.split_off(last_newline + 1);
    accumulator.pop();
    let lines = accumulator.split(|&b| b == b'\n').map(decode_line).collect();
    (rest, lines)
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Stateful wrapper owning the accumulator between reads.
#[derive(Debug, Default)]
pub struct LineFramer {
    accumulator: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self { accumulator: Vec::with_capacity(1024) }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let (rest, lines) = push(std::mem::take(&mut self.accumulator), bytes);
        self.accumulator = rest;
        lines
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending(&self) -> &[u8] {
        &self.accumulator
    }

    pub fn reset(&mut self) {
        self.accumulator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_split_across_reads() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"AB").is_empty());
        assert_eq!(framer.push(b"CD\nEF"), vec!["ABCD".to_string()]);
        assert_eq!(framer.pending(), b"EF");
        assert_eq!(framer.push(b"GH\n"), vec!["EFGH".to_string()]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_chunk_without_newline_emits_nothing() {
        let (acc, lines) = push(Vec::new(), b"no newline yet");
        assert!(lines.is_empty());
        assert_eq!(acc, b"no newline yet");
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let (acc, lines) = push(Vec::new(), b"one\ntwo\nthree\npart");
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(acc, b"part");
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let (acc, lines) = push(Vec::new(), b"a\n\n\nb\n");
        assert_eq!(lines, vec!["a", "", "", "b"]);
        assert!(acc.is_empty());

        let (_, lines) = push(Vec::new(), b"\n");
        assert_eq!(lines, vec![""]);
    }

    #[test]
    fn test_crlf_and_whitespace_trimmed() {
        let (_, lines) = push(Vec::new(), b"ready\r\n  spaced \t\r\n");
        assert_eq!(lines, vec!["ready", "spaced"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let (_, lines) = push(Vec::new(), b"ok\xff\xfe!\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok"));
        assert!(lines[0].contains('\u{FFFD}'));
        assert!(lines[0].ends_with('!'));
    }

    #[test]
    fn test_utf8_sequence_split_across_reads() {
        let text = "temp 23\u{00B0}C\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC2).unwrap() + 1;
        let (acc, lines) = push(Vec::new(), &text[..split]);
        assert!(lines.is_empty());
        let (_, lines) = push(acc, &text[split..]);
        assert_eq!(lines, vec!["temp 23\u{00B0}C"]);
    }

    #[test]
    fn test_every_chunking_reassembles_input() {
        let input: &[u8] = b"alpha\nbeta\n\ngamma-delta\nepsilon";
        for first in 0..=input.len() {
            for second in first..=input.len() {
                let mut framer = LineFramer::new();
                let mut lines = Vec::new();
                lines.extend(framer.push(&input[..first]));
                lines.extend(framer.push(&input[first..second]));
                lines.extend(framer.push(&input[second..]));

                let mut rebuilt = lines.join("\n").into_bytes();
                rebuilt.push(b'\n');
                rebuilt.extend_from_slice(framer.pending());
                assert_eq!(rebuilt, input, "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn test_reset_drops_partial_line() {
        let mut framer = LineFramer::new();
        framer.push(b"garbage");
        framer.reset();
        assert_eq!(framer.push(b"clean\n"), vec!["clean"]);
    }
}
