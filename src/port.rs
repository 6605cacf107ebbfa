use anyhow::Result;
use log::warn;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::cli::SerialOpts;

const READ_SLICE: Duration = Duration::from_millis(20);

/// Longest partial line kept while waiting for its `\n`.
const MAX_PENDING: usize = 1024;

pub fn open_port(opts: &SerialOpts) -> Result<Box<dyn SerialPort>> {
    let builder = serialport::new(&opts.dev, opts.baud)
        .timeout(READ_SLICE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(if opts.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        });

    builder
        .open()
        .map_err(|e| anyhow::anyhow!("open {}: {}", opts.dev, e))
}

/// CRLF line I/O on a port whose reads time out in short slices.
pub struct LinePort<P = Box<dyn SerialPort>> {
    port: P,
    pending: Vec<u8>,
}

impl<P: Read + Write> LinePort<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            pending: Vec::with_capacity(256),
        }
    }

    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut out = Vec::with_capacity(line.len() + 2);
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
        self.port.write_all(&out)?;
        self.port.flush()
    }

    /// Next complete line, or `None` once `deadline` passes. A line
    /// already buffered is returned without reading; otherwise at least
    /// one read is attempted.
    pub fn read_line(&mut self, deadline: Instant) -> std::io::Result<Option<String>> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.pending.len() > MAX_PENDING {
                warn!("[port] dropping {} bytes without line end", self.pending.len());
                self.pending.clear();
            }
            match self.port.read(&mut buf) {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Ok(self.take_line());
            }
        }
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &P {
        &self.port
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw);
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// In-memory port for exercising the line layer without hardware.
#[cfg(test)]
pub mod scripted {
    use std::collections::VecDeque;
    use std::io::{self, ErrorKind, Read, Write};

    #[derive(Debug, Default)]
    pub struct ScriptedPort {
        /// Bytes handed out by `read`, in order.
        pub input: VecDeque<u8>,
        /// Chunk returned by every read once `input` is drained.
        pub repeat: Option<Vec<u8>>,
        /// Everything written so far.
        pub written: Vec<u8>,
    }

    impl ScriptedPort {
        pub fn with_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
            let mut port = Self::default();
            for line in lines {
                port.input.extend(line.as_bytes());
                port.input.extend(b"\r\n");
            }
            port
        }

        pub fn written_lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.written)
                .split("\r\n")
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.input.is_empty() {
                let n = buf.len().min(self.input.len());
                for (slot, b) in buf.iter_mut().zip(self.input.drain(..n)) {
                    *slot = b;
                }
                return Ok(n);
            }
            match &self.repeat {
                Some(chunk) => {
                    let n = buf.len().min(chunk.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None => Err(io::Error::new(ErrorKind::TimedOut, "no data")),
            }
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
