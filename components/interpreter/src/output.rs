//! Output sinks for the print builtins

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Cloneable in-memory sink
///
/// Every clone appends to the same buffer, so a test can hand one clone to
/// a machine and read the output through another.
///
/// # Example
///
/// ```
/// use std::io::Write;
/// use interpreter::SharedOutput;
///
/// let output = SharedOutput::new();
/// let mut sink = output.clone();
/// write!(sink, "120").unwrap();
/// assert_eq!(output.contents(), "120");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedOutput {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Raw bytes written so far
    pub fn bytes(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
