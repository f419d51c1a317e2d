/// Turns arbitrarily split process output back into lines.
///
/// Splitting happens on raw bytes, so a multi-byte UTF-8 character cut in half by a chunk
/// boundary is reassembled before decoding. Invalid UTF-8 is replaced, not rejected.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    /// Consumes a chunk, returning every line it completed. The trailing fragment, if any, is
    /// kept until a later chunk completes it or [LineAssembler::finish] is called.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = vec![];
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(decode_line(&self.pending));
            self.pending.clear();
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Signals end of output. Returns the unterminated last line, if there was one.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(decode_line(&self.pending))
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    // Windows binaries end lines with CRLF
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
