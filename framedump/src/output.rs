// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Where the capture bytes end up.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};

const DUMP_NAME: &str = "dump.pcap";

/// Makes a new directory under the system temp dir and returns the path of
/// the dump file inside it. The directory is left behind on purpose: it holds
/// the capture.
pub fn default_output_path(gzip: bool) -> io::Result<PathBuf> {
    let dir = tempfile::Builder::new().prefix("framedump").tempdir()?;
    let name = if gzip {
        format!("{DUMP_NAME}.gz")
    } else {
        DUMP_NAME.to_owned()
    };
    Ok(dir.into_path().join(name))
}

pub enum OutputSink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputSink {
    pub fn create(path: &Path, gzip: bool) -> io::Result<OutputSink> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)?;
        let file = BufWriter::new(file);

        Ok(if gzip {
            OutputSink::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            OutputSink::Plain(file)
        })
    }

    /// Writes out anything buffered, including the gzip trailer.
    pub fn finish(self) -> io::Result<()> {
        let mut file = match self {
            OutputSink::Plain(w) => w,
            OutputSink::Gzip(w) => w.finish()?,
        };
        file.flush()
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Plain(w) => w.write(buf),
            OutputSink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Plain(w) => w.flush(),
            OutputSink::Gzip(w) => w.flush(),
        }
    }
}
