use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Copies every log line to the console and to an append-only file.
/// The file copy is kept even when the console is gone.
struct Tee<C, F> {
    console: C,
    file: F,
}

impl<C: Write, F: Write> Write for Tee<C, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        let _ = self.console.write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

/// Installs the global logger. `RUST_LOG` overrides `level`.
pub fn init(level: LevelFilter, log_file: Option<&Path>) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env();

    let mut file_error = None;
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(Tee {
                    console: io::stderr(),
                    file,
                })));
            }
            Err(e) => file_error = Some((path.to_path_buf(), e)),
        }
    }
    builder.init();

    if let Some((path, e)) = file_error {
        log::warn!("Could not open log file {:?}: {}. Logging to stderr only.", path, e);
    }
    log::debug!("Logger initialized.");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedConsole;

    impl Write for ClosedConsole {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn file_copy_survives_closed_console() {
        let mut tee = Tee {
            console: ClosedConsole,
            file: Vec::new(),
        };
        tee.write_all(b"2025-03-01 09:00:00 [INFO] - sweep started\n")
            .unwrap();
        tee.flush().unwrap();
        assert_eq!(tee.file, b"2025-03-01 09:00:00 [INFO] - sweep started\n");
    }

    #[test]
    fn writes_reach_both_targets() {
        let mut tee = Tee {
            console: Vec::new(),
            file: Vec::new(),
        };
        tee.write_all(b"line\n").unwrap();
        assert_eq!(tee.console, b"line\n");
        assert_eq!(tee.file, b"line\n");
    }
}
