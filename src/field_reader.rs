// EMF Field Reader Module
// Big-endian primitive reads over a forward-only byte stream

use std::io::{ErrorKind, Read};

use byteorder::{BigEndian, ByteOrder};
use tracing::warn;

use crate::emf_tools::{EmfError, Result};

/// Forward-only reader of fixed-width big-endian fields.
///
/// Every read either fills the requested width completely or fails with
/// [`EmfError::TruncatedInput`]. `io_error` is `None` when the stream simply
/// ran out and carries the error kind when the source failed. Bytes obtained
/// before a failure are still consumed, so a failed field must not be retried.
#[derive(Debug)]
pub struct FieldReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> FieldReader<R> {
    pub fn new(inner: R) -> Self {
        FieldReader { inner, position: 0 }
    }

    /// Total number of bytes consumed from the stream so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Fill `buf` completely from the stream.
    pub fn read_bytes(&mut self, buf: &mut [u8], field: &'static str) -> Result<()> {
        let (got, io_error) = self.fill(buf);
        if got == buf.len() {
            Ok(())
        } else {
            Err(EmfError::TruncatedInput {
                field,
                bits: buf.len() as u32 * 8,
                got,
                io_error,
            })
        }
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf, field)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf, field)?;
        Ok(BigEndian::read_u16(&buf))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf, field)?;
        Ok(BigEndian::read_u32(&buf))
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf, field)?;
        Ok(BigEndian::read_u64(&buf))
    }

    /// Read until `buf` is full or the stream stops yielding bytes.
    /// Returns the number of bytes placed in `buf` and, if the source failed
    /// rather than reaching EOF, the error kind.
    fn fill(&mut self, buf: &mut [u8]) -> (usize, Option<ErrorKind>) {
        let mut got = 0;
        while got < buf.len() {
            match self.inner.read(&mut buf[got..]) {
                Ok(0) => break,
                Ok(n) => {
                    got += n;
                    self.position += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(position = self.position, error = %e, "read failed");
                    return (got, Some(e.kind()));
                }
            }
        }
        (got, None)
    }
}
