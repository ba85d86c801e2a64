// prefix.rs — Line-oriented writer decorator.

use std::io::{self, Write};

/// Prepends a fixed byte prefix to each line written through it. The prefix
/// is emitted only at the start of a line, so writes that split or merge
/// lines are tagged correctly.
pub struct PrefixWriter<W: Write> {
    inner: W,
    prefix: Vec<u8>,
    in_line: bool,
}

impl<W: Write> PrefixWriter<W> {
    pub fn new(inner: W, prefix: impl Into<Vec<u8>>) -> Self {
        PrefixWriter {
            inner,
            prefix: prefix.into(),
            in_line: false,
        }
    }

    /// Forgets a partially written line; the next write starts a fresh one.
    pub fn reset(&mut self) {
        self.in_line = false;
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for PrefixWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        let mut n = 0;
        while !rest.is_empty() {
            match rest.iter().position(|&b| b == b'\n') {
                None => {
                    if !self.in_line {
                        self.inner.write_all(&self.prefix)?;
                    }
                    self.in_line = true;
                    self.inner.write_all(rest)?;
                    return Ok(n + rest.len());
                }
                Some(nl) => {
                    if !self.in_line {
                        self.inner.write_all(&self.prefix)?;
                    }
                    let line = &rest[..=nl];
                    self.inner.write_all(line)?;
                    n += line.len();
                    self.in_line = false;
                    rest = &rest[nl + 1..];
                }
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(writes: &[&str]) -> String {
        let mut pw = PrefixWriter::new(Vec::new(), b"> ".to_vec());
        for w in writes {
            pw.write_all(w.as_bytes()).unwrap();
        }
        String::from_utf8(pw.into_inner()).unwrap()
    }

    #[test]
    fn single_line() {
        assert_eq!(collect(&["hello\n"]), "> hello\n");
    }

    #[test]
    fn multi_line_buffer() {
        assert_eq!(collect(&["one\ntwo\nthree\n"]), "> one\n> two\n> three\n");
    }

    #[test]
    fn split_line_gets_one_prefix() {
        assert_eq!(collect(&["hel", "lo\n"]), "> hello\n");
    }

    #[test]
    fn trailing_partial_line() {
        assert_eq!(collect(&["done\npart"]), "> done\n> part");
    }

    #[test]
    fn write_resuming_after_partial_line() {
        assert_eq!(collect(&["a", "b\nc\n"]), "> ab\n> c\n");
    }

    #[test]
    fn empty_write_is_a_noop() {
        assert_eq!(collect(&["", "x\n"]), "> x\n");
    }
}
