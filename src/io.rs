use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::UmiAllowlist;

/// Destination for SAM lines.
///
/// Lines are written verbatim. The `Sink` variant discards everything so
/// callers can route records unconditionally whether or not an output was
/// requested.
pub enum RecordSink {
    Plain(Box<dyn Write>),
    Gzip(GzEncoder<BufWriter<File>>),
    Sink,
}

impl RecordSink {
    /// Write one raw line (which already carries its terminator, if any).
    pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
        match self {
            Self::Plain(w) => w.write_all(line)?,
            Self::Gzip(w) => w.write_all(line)?,
            Self::Sink => {}
        }
        Ok(())
    }

    /// Flush buffered output and, for gzip, write the stream trailer.
    pub fn finish(self) -> Result<()> {
        match self {
            Self::Plain(mut w) => w.flush().context("Failed to flush SAM output")?,
            Self::Gzip(w) => {
                w.finish()
                    .context("Failed to finish gzip SAM output")?
                    .flush()
                    .context("Failed to flush SAM output")?;
            }
            Self::Sink => {}
        }
        Ok(())
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "gz")
}

/// Create a SAM writer at `path`. If `path` ends with `.gz`, output is
/// gzip-compressed.
pub fn create_sam_writer(path: &Path) -> Result<RecordSink> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let writer = BufWriter::new(file);
    if is_gzip(path) {
        Ok(RecordSink::Gzip(GzEncoder::new(writer, Compression::default())))
    } else {
        Ok(RecordSink::Plain(Box::new(writer)))
    }
}

/// Open a SAM file for line reading, decompressing `.gz` input.
pub fn open_sam_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(file)))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Load the newline-delimited UMI list.
pub fn load_allowlist(path: &Path) -> Result<UmiAllowlist> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open UMI list {}", path.display()))?;
    UmiAllowlist::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to read UMI list {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_gzip_writer_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.sam.gz");

        let mut sink = create_sam_writer(&path).unwrap();
        assert!(matches!(sink, RecordSink::Gzip(_)));
        sink.write_line(b"@HD\tVN:1.0\n").unwrap();
        sink.write_line(b"r1\t0\t1\t10\t255\t5M\n").unwrap();
        sink.finish().unwrap();

        let mut text = String::new();
        open_sam_reader(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "@HD\tVN:1.0\nr1\t0\t1\t10\t255\t5M\n");
    }

    #[test]
    fn test_sink_discards() {
        let mut sink = RecordSink::Sink;
        sink.write_line(b"anything\n").unwrap();
        sink.finish().unwrap();
    }

    #[test]
    fn test_load_allowlist_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_allowlist(&dir.path().join("nope.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to open UMI list"));
    }
}
