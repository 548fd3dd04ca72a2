//! Operator-facing output streams
//!
//! The reconciler never writes to the process globals directly; it writes
//! through an [`Output`] handle injected at construction. Production code
//! passes real stdio, tests pass in-memory buffers and assert on what the
//! operator would have seen.

use std::io::Write;
use std::sync::{Arc, Mutex};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Cloneable pair of output sinks.
#[derive(Clone)]
pub struct Output {
    stdout: Sink,
    stderr: Sink,
}

impl Output {
    /// Real process stdout/stderr.
    pub fn stdio() -> Self {
        Self {
            stdout: Arc::new(Mutex::new(Box::new(std::io::stdout()))),
            stderr: Arc::new(Mutex::new(Box::new(std::io::stderr()))),
        }
    }

    /// In-memory sinks plus a handle for reading back what was written.
    pub fn buffered() -> (Self, CapturedOutput) {
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let output = Self {
            stdout: Arc::new(Mutex::new(Box::new(SharedBuffer(stdout.clone())))),
            stderr: Arc::new(Mutex::new(Box::new(SharedBuffer(stderr.clone())))),
        };
        (output, CapturedOutput { stdout, stderr })
    }

    pub fn write_out(&self, text: &str) -> std::io::Result<()> {
        let mut sink = self.stdout.lock().expect("stdout sink poisoned");
        sink.write_all(text.as_bytes())?;
        sink.flush()
    }

    pub fn write_err(&self, text: &str) -> std::io::Result<()> {
        let mut sink = self.stderr.lock().expect("stderr sink poisoned");
        sink.write_all(text.as_bytes())?;
        sink.flush()
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::stdio()
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Read-back handle for [`Output::buffered`].
pub struct CapturedOutput {
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout.lock().expect("buffer poisoned")).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr.lock().expect("buffer poisoned")).into_owned()
    }
}
