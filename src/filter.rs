//! Mirror-side redaction of helper envelopes.
//!
//! Applies only to what the caller's terminal sees; capture never goes
//! through here, so the envelope stays intact for later extraction.

use crate::envelope::{JSON_END, JSON_START};

/// Line-oriented state machine over the mirrored stdout stream.
///
/// Outside an envelope every completed line passes through. A line equal
/// to `JSON_START` flips to redaction; everything up to and including the
/// matching `JSON_END` line is suppressed.
#[derive(Debug, Default)]
pub(crate) struct MirrorFilter {
    redacting: bool,
    /// Current, not yet terminated line.
    line: Vec<u8>,
    /// Prefix of `line` already mirrored by an eager flush.
    emitted: usize,
}

impl MirrorFilter {
    pub fn new() -> MirrorFilter {
        MirrorFilter::default()
    }

    /// Feeds a chunk of child stdout; pushes mirror-visible bytes onto `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        for &byte in chunk {
            self.line.push(byte);
            if byte == b'\n' {
                self.complete_line(out);
            }
        }
    }

    /// Eagerly mirrors the unterminated tail so the caller sees partial
    /// progress lines. The tail stays buffered: the completed line is
    /// still inspected whole, which also means a marker split across
    /// reads has already leaked its prefix by the time it is recognized.
    pub fn flush_partial(&mut self, out: &mut Vec<u8>) {
        if self.redacting {
            return;
        }
        out.extend_from_slice(&self.line[self.emitted..]);
        self.emitted = self.line.len();
    }

    fn complete_line(&mut self, out: &mut Vec<u8>) {
        let body = &self.line[..self.line.len() - 1];
        if !self.redacting && body == JSON_START.as_bytes() {
            self.redacting = true;
        } else if self.redacting {
            if body == JSON_END.as_bytes() {
                self.redacting = false;
            }
        } else {
            out.extend_from_slice(&self.line[self.emitted..]);
        }
        self.line.clear();
        self.emitted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::MirrorFilter;

    fn run(chunks: &[&[u8]]) -> Vec<u8> {
        let mut filter = MirrorFilter::new();
        let mut out = Vec::new();
        for chunk in chunks {
            filter.feed(chunk, &mut out);
            filter.flush_partial(&mut out);
        }
        out
    }

    #[test]
    fn plain_lines_pass_through() {
        assert_eq!(run(&[b"one\ntwo\n"]), b"one\ntwo\n");
    }

    #[test]
    fn envelope_is_suppressed_markers_included() {
        let fed: &[u8] = b"hi\nJSON_START\n{\"value\":1}\nJSON_END\nbye\n";
        assert_eq!(run(&[fed]), b"hi\nbye\n");
    }

    #[test]
    fn second_envelope_is_suppressed_too() {
        let fed: &[u8] = b"JSON_START\na\nJSON_END\nmid\nJSON_START\nb\nJSON_END\n";
        assert_eq!(run(&[fed]), b"mid\n");
    }

    #[test]
    fn stray_end_marker_outside_envelope_is_ordinary_output() {
        assert_eq!(run(&[b"JSON_END\nx\n"]), b"JSON_END\nx\n");
    }

    #[test]
    fn partial_line_is_shown_eagerly_without_duplication() {
        let mut filter = MirrorFilter::new();
        let mut out = Vec::new();
        filter.feed(b"progress 50%", &mut out);
        filter.flush_partial(&mut out);
        assert_eq!(out, b"progress 50%");
        filter.feed(b"... done\n", &mut out);
        assert_eq!(out, b"progress 50%... done\n");
    }

    #[test]
    fn start_marker_split_across_reads_leaks_its_prefix() {
        // The eager flush runs before the line is complete, so the first
        // half of the marker reaches the mirror; redaction still starts
        // once the full line is seen.
        let out = run(&[b"JSON_ST", b"ART\nsecret\nJSON_END\nvisible\n"]);
        assert_eq!(out, b"JSON_STvisible\n");
    }

    #[test]
    fn partial_line_inside_envelope_stays_hidden() {
        let out = run(&[b"JSON_START\n{\"half\":", b"1}\nJSON_END\nok\n"]);
        assert_eq!(out, b"ok\n");
    }
}
