//! Bounded line scanner.
//!
//! Splits a byte stream on `\n` using a caller-supplied buffer whose length is
//! the maximum line size. A line that cannot fit yields [`ScanError::TooLong`].

use std::io::{self, Read};

use crate::error::ScanError;

pub struct LineScanner<'b, R> {
    reader: R,
    buf: &'b mut [u8],
    start: usize,
    end: usize,
    eof: bool,
}

impl<'b, R: Read> LineScanner<'b, R> {
    pub fn new(reader: R, buf: &'b mut [u8]) -> Self {
        Self {
            reader,
            buf,
            start: 0,
            end: 0,
            eof: false,
        }
    }

    /// Maximum line size in bytes, terminator included.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Returns the next line without its terminator, or `None` at end of stream.
    pub fn next_line(&mut self) -> Result<Option<&[u8]>, ScanError> {
        loop {
            let pending = &self.buf[self.start..self.end];
            if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line_start = self.start;
                self.start += pos + 1;
                return Ok(Some(trim_cr(&self.buf[line_start..line_start + pos])));
            }

            if self.eof {
                if self.start == self.end {
                    return Ok(None);
                }
                let line_start = self.start;
                self.start = self.end;
                return Ok(Some(trim_cr(&self.buf[line_start..self.end])));
            }

            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }
            if self.end == self.buf.len() {
                return Err(ScanError::TooLong {
                    limit: self.buf.len(),
                });
            }

            match self.reader.read(&mut self.buf[self.end..]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.end += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ScanError::Io(e)),
            }
        }
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.split_last() {
        Some((b'\r', rest)) => rest,
        _ => line,
    }
}
