use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Container input from a file, or from stdin for "-"
pub struct InputReader {
    reader: Box<dyn Read>,
    name: String,
    is_pipe: bool,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path = input_path.as_ref();
        let name = path.to_string_lossy().into_owned();
        let is_pipe = name == "-";

        let reader: Box<dyn Read> = if is_pipe {
            Box::new(io::stdin().lock())
        } else {
            let file = File::open(path).with_context(|| format!("Failed to open {name}"))?;
            Box::new(BufReader::new(file))
        };

        Ok(Self {
            reader,
            name,
            is_pipe,
        })
    }

    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Reads the whole input; traversal works on one in-memory buffer.
    pub fn read_all(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.reader
            .read_to_end(&mut data)
            .with_context(|| format!("Failed to read {}", self.name))?;

        log::debug!(
            "Read {} bytes from {}",
            data.len(),
            if self.is_pipe() { "stdin" } else { &self.name }
        );
        Ok(data)
    }
}
