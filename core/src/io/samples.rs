use crate::io::stream::SampleWriter;
use crate::prelude::{ProcessingResult, Sample};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

/// Bytes per interleaved little-endian `f32` I/Q pair.
pub const COMPLEX64_BYTES: usize = 8;

/// Decodes whole complex64 records; a trailing partial record is ignored.
pub fn decode_complex64(bytes: &[u8]) -> Vec<Sample> {
    let whole = bytes.len() / COMPLEX64_BYTES * COMPLEX64_BYTES;
    let mut floats = vec![0f32; whole / 4];
    LittleEndian::read_f32_into(&bytes[..whole], &mut floats);
    floats
        .chunks_exact(2)
        .map(|pair| Sample::new(pair[0], pair[1]))
        .collect()
}

/// Reads raw complex64 samples from a headerless file.
///
/// `byte_offset` skips to a known pulse boundary; `count` limits how many
/// samples are returned (the rest of the file when `None`).
pub fn read_complex64<P: AsRef<Path>>(
    path: P,
    byte_offset: u64,
    count: Option<usize>,
) -> ProcessingResult<Vec<Sample>> {
    let mut file = BufReader::new(File::open(path.as_ref())?);
    file.seek(SeekFrom::Start(byte_offset))?;
    let mut bytes = Vec::new();
    match count {
        Some(count) => {
            file.take((count * COMPLEX64_BYTES) as u64)
                .read_to_end(&mut bytes)?;
        }
        None => {
            file.read_to_end(&mut bytes)?;
        }
    }
    if bytes.len() % COMPLEX64_BYTES != 0 {
        warn!(
            "{} ends with a partial sample ({} stray bytes)",
            path.as_ref().display(),
            bytes.len() % COMPLEX64_BYTES
        );
    }
    Ok(decode_complex64(&bytes))
}

pub fn write_complex64<W: Write>(writer: &mut W, samples: &[Sample]) -> ProcessingResult<()> {
    for sample in samples {
        writer.write_f32::<LittleEndian>(sample.re)?;
        writer.write_f32::<LittleEndian>(sample.im)?;
    }
    Ok(())
}

pub fn write_complex64_file<P: AsRef<Path>>(path: P, samples: &[Sample]) -> ProcessingResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_complex64(&mut writer, samples)?;
    writer.flush()?;
    Ok(())
}

/// Plays a capture file into a sample stream from a background thread.
#[derive(Debug, Clone)]
pub struct FileSampleSource {
    pub path: PathBuf,
    pub byte_offset: u64,
    pub chunk_samples: usize,
}

impl FileSampleSource {
    pub fn new<P: Into<PathBuf>>(path: P, byte_offset: u64) -> Self {
        Self {
            path: path.into(),
            byte_offset,
            chunk_samples: 1 << 16,
        }
    }

    /// Streams the file, closing the writer at end of file. The thread
    /// returns the number of samples delivered.
    pub fn spawn(self, writer: SampleWriter) -> JoinHandle<ProcessingResult<u64>> {
        thread::spawn(move || {
            let mut file = BufReader::new(File::open(&self.path)?);
            file.seek(SeekFrom::Start(self.byte_offset))?;
            let chunk_bytes = self.chunk_samples.max(1) * COMPLEX64_BYTES;
            let mut delivered = 0u64;
            loop {
                let mut bytes = Vec::with_capacity(chunk_bytes);
                let read = file
                    .by_ref()
                    .take(chunk_bytes as u64)
                    .read_to_end(&mut bytes)?;
                if read == 0 {
                    break;
                }
                let chunk = decode_complex64(&bytes);
                if chunk.is_empty() {
                    break;
                }
                delivered += chunk.len() as u64;
                if writer.push(chunk).is_err() {
                    debug!("sample consumer went away, stopping file playback");
                    break;
                }
            }
            debug!(
                "file playback of {} finished after {} samples",
                self.path.display(),
                delivered
            );
            Ok(delivered)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::stream::sample_channel;
    use std::time::{Duration, Instant};
    use tempfile::NamedTempFile;

    fn ramp(len: usize) -> Vec<Sample> {
        (0..len)
            .map(|i| Sample::new(i as f32, -(i as f32)))
            .collect()
    }

    #[test]
    fn file_round_trip_honours_offset_and_count() {
        let temp = NamedTempFile::new().unwrap();
        write_complex64_file(temp.path(), &ramp(10)).unwrap();

        let samples = read_complex64(temp.path(), 3 * COMPLEX64_BYTES as u64, Some(4)).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], Sample::new(3.0, -3.0));
        assert_eq!(samples[3], Sample::new(6.0, -6.0));
    }

    #[test]
    fn decode_ignores_partial_trailing_record() {
        let mut bytes = Vec::new();
        write_complex64(&mut bytes, &ramp(2)).unwrap();
        bytes.extend_from_slice(&[0, 1, 2]);
        assert_eq!(decode_complex64(&bytes).len(), 2);
    }

    #[test]
    fn file_source_streams_every_sample() {
        let temp = NamedTempFile::new().unwrap();
        write_complex64_file(temp.path(), &ramp(100)).unwrap();

        let (writer, stream) = sample_channel(4);
        let mut source = FileSampleSource::new(temp.path(), 0);
        source.chunk_samples = 30;
        let handle = source.spawn(writer);

        let mut received = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while let Some(chunk) = stream.next_chunk(deadline) {
            received.extend(chunk);
        }
        assert_eq!(handle.join().unwrap().unwrap(), 100);
        assert_eq!(received, ramp(100));
    }
}
