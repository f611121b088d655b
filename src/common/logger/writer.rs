use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

/// Removes ANSI escape sequences so the log file stays plain text.
pub fn strip_ansi_escapes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Appending log writer that trims the file back to `max_lines` once enough
/// new lines have accumulated.
#[derive(Clone)]
pub(crate) struct CircularFileWriter {
    path: PathBuf,
    max_lines: u32,
    state: Arc<Mutex<WriterState>>,
}

struct WriterState {
    file: Option<File>,
    lines_since_prune: u32,
}

impl CircularFileWriter {
    pub fn new(path: impl Into<PathBuf>, max_lines: u32) -> Self {
        Self {
            path: path.into(),
            max_lines: max_lines.max(1),
            state: Arc::new(Mutex::new(WriterState {
                file: None,
                lines_since_prune: 0,
            })),
        }
    }

    /// Lines written between two prunes: 10% of the cap, at least 50.
    fn prune_threshold(&self) -> u32 {
        (self.max_lines / 10).max(50)
    }

    fn prune(&self, state: &mut WriterState) -> io::Result<()> {
        if !Path::new(&self.path).exists() {
            return Ok(());
        }

        let lines: Vec<String> = BufReader::new(File::open(&self.path)?)
            .lines()
            .collect::<Result<_, _>>()?;

        if lines.len() > self.max_lines as usize {
            // Drop the append handle first; the file is rewritten in place.
            state.file = None;
            let start = lines.len() - self.max_lines as usize;
            let mut file = File::create(&self.path)?;
            for line in &lines[start..] {
                writeln!(file, "{}", line)?;
            }
        }
        Ok(())
    }
}

impl io::Write for CircularFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();

        if state.file.is_none() {
            state.file = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            );
        }
        if let Some(file) = state.file.as_mut() {
            file.write_all(buf)?;
        }

        state.lines_since_prune += buf.iter().filter(|&&b| b == b'\n').count() as u32;
        if state.lines_since_prune >= self.prune_threshold() {
            if let Err(e) = self.prune(&mut state) {
                eprintln!("Failed to prune log file: {}", e);
            }
            state.lines_since_prune = 0;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.state.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CircularFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
