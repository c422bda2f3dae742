//! Reassembles newline-delimited lines from arbitrarily fragmented bytes.

/// Turns a sequence of byte chunks into complete lines.
///
/// Holds back two things across calls: the text after the last newline,
/// and up to three bytes of a UTF-8 sequence cut off by the chunk
/// boundary. Lines come out with the `\n` (and a preceding `\r`)
/// stripped. Blank lines are dropped, so the output does not depend on
/// where the chunk boundaries fell.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: String,
    partial_utf8: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every line completed by them.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode(chunk);
        self.push_str(&text)
    }

    /// Feed already-decoded text and return every line completed by it.
    pub fn push_str(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.pending.find('\n') {
            let line = strip_cr(&self.pending[..newline_pos]).to_string();
            self.pending.drain(..newline_pos + 1);

            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// End of input: return the unterminated trailing fragment, if any.
    ///
    /// A multi-byte sequence that never completed is decoded lossily.
    /// The splitter is empty afterwards and can be reused.
    pub fn finish(&mut self) -> Option<String> {
        if !self.partial_utf8.is_empty() {
            let tail = std::mem::take(&mut self.partial_utf8);
            self.pending.push_str(&String::from_utf8_lossy(&tail));
        }
        let rest = std::mem::take(&mut self.pending);
        let line = strip_cr(&rest);
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }

    /// Text received after the last newline.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.partial_utf8.is_empty()
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.partial_utf8);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        // Invalid no matter what follows.
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Truncated sequence: wait for the next chunk.
                        None => {
                            self.partial_utf8 = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}
