//! `std::io` adapters.
//!
//! These let a durable stream stand in for a file in code written against
//! the standard traits. Errors convert through `From<CoreError> for io::Error`.

use crate::stream::durable::DurableStream;
use durastream_storage::StreamBackend;
use std::io::{self, Read, Seek, SeekFrom, Write};

impl<T: StreamBackend, B: StreamBackend> Read for DurableStream<T, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(DurableStream::read(self, buf)?)
    }
}

impl<T: StreamBackend, B: StreamBackend> Write for DurableStream<T, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        DurableStream::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(DurableStream::flush(self)?)
    }
}

impl<T: StreamBackend, B: StreamBackend> Seek for DurableStream<T, B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(DurableStream::seek(self, pos)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{DurableStream, StreamConfig};
    use durastream_storage::InMemoryBackend;
    use std::io::{Read, Seek, SeekFrom, Write};

    #[test]
    fn standard_traits_drive_the_stream() {
        let target = InMemoryBackend::with_data(b"0123".to_vec());
        let mut stream =
            DurableStream::create(target.clone(), InMemoryBackend::new(), StreamConfig::default())
                .unwrap();

        Seek::seek(&mut stream, SeekFrom::Start(2)).unwrap();
        stream.write_all(b"abcd").unwrap();
        Write::flush(&mut stream).unwrap();
        assert_eq!(target.data(), b"01abcd");

        Seek::seek(&mut stream, SeekFrom::Start(0)).unwrap();
        let mut contents = Vec::new();
        stream.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"01abcd");

        stream.rollback().unwrap();
        assert_eq!(target.data(), b"0123");
    }

    #[test]
    fn negative_seek_maps_to_invalid_input() {
        let mut stream =
            DurableStream::create(InMemoryBackend::new(), InMemoryBackend::new(), StreamConfig::default())
                .unwrap();
        let err = Seek::seek(&mut stream, SeekFrom::Current(-4)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn standard_traits_work_inside_runtime() {
        let target = InMemoryBackend::new();
        let mut stream =
            DurableStream::create(target.clone(), InMemoryBackend::new(), StreamConfig::default())
                .unwrap();

        stream.write_all(b"x").unwrap();
        assert_eq!(target.data(), b"x");
        stream.rollback_async().await.unwrap();
        assert!(target.data().is_empty());
    }
}
