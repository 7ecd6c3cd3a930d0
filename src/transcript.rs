//! Daily-rotated transcript writer. A plain-text, append-only record of
//! bytes forwarded in either direction between the up/down rings and the
//! Telnet peer, with ANSI/VT escape sequences stripped before they hit
//! disk.

pub mod ansi_filter;

use chrono::{Local, NaiveDate};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use ansi_filter::Filter;

/// Appends `.<YYYY-MM-DD>.log` to the user-supplied base path and reopens
/// a fresh file whenever the local date rolls over, one file per day.
pub struct Transcript {
    base: PathBuf,
    date: NaiveDate,
    file: File,
    filter: Filter,
}

impl Transcript {
    pub fn open(base: impl Into<PathBuf>) -> io::Result<Transcript> {
        let base = base.into();
        let date = Local::now().date_naive();
        let file = open_for(&base, date)?;
        Ok(Transcript {
            base,
            date,
            file,
            filter: Filter::new(),
        })
    }

    /// Filters `bytes` through the ANSI stripper and appends the result,
    /// rotating to a new day's file first if the date has changed.
    pub fn write_forwarded(&mut self, bytes: &[u8]) -> io::Result<()> {
        let today = Local::now().date_naive();
        if today != self.date {
            self.file = open_for(&self.base, today)?;
            self.date = today;
        }
        let filtered = self.filter.apply(bytes);
        if !filtered.is_empty() {
            self.file.write_all(&filtered)?;
        }
        Ok(())
    }

    /// Writes a single descriptive line, bypassing the ANSI filter. Used
    /// alongside a matching stderr log line whenever a fatal error occurs
    /// with an open transcript.
    pub fn write_note(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{line}")
    }
}

fn open_for(base: &std::path::Path, date: NaiveDate) -> io::Result<File> {
    let path = format!("{}.{}.log", base.display(), date.format("%Y-%m-%d"));
    OpenOptions::new().create(true).append(true).open(path)
}
