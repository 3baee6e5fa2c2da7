use embedded_io::{Read, Seek, SeekFrom};
use embedded_io_adapters::std::FromStd;
use scrub_core::Entry;
use std::path::PathBuf;

/// Storage rooted at a host directory; every path is resolved against `root`.
pub struct StdFileHandler {
    root: PathBuf,
}

impl StdFileHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl embedded_io::ErrorType for StdFileHandler {
    type Error = <FromStd<std::fs::File> as embedded_io::ErrorType>::Error;
}

impl scrub_core::FileHandler for StdFileHandler {
    type File = FromStd<std::fs::File>;

    fn remount(&mut self) -> Result<(), Self::Error> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is gone", self.root.display()),
            ))
        }
    }

    fn open(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        Ok(FromStd::new(std::fs::File::open(self.root.join(path))?))
    }

    /// std::fs::File automatically closed when dropped
    fn close(&mut self, _file: Self::File) -> Result<(), Self::Error> {
        Ok(())
    }

    fn len(&mut self, file: &mut Self::File) -> Result<u64, Self::Error> {
        Ok(file.inner().metadata()?.len())
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
        file.read(buf)
    }

    fn seek(&mut self, file: &mut Self::File, pos: SeekFrom) -> Result<u64, Self::Error> {
        let len = file.inner().metadata()?.len() as i128;
        let target = match pos {
            SeekFrom::Start(v) => v as i128,
            SeekFrom::Current(v) => file.stream_position()? as i128 + v as i128,
            SeekFrom::End(v) => len + v as i128,
        };
        // std allows seeking past the end, storage media don't
        if !(0..=len).contains(&target) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("seek to {} outside 0..={}", target, len),
            ));
        }
        file.seek(SeekFrom::Start(target as u64))
    }

    fn iterate_dir<C: FnMut(Entry<'_>)>(&mut self, path: &str, mut f: C) -> Result<(), Self::Error> {
        for entry in std::fs::read_dir(self.root.join(path))?.filter_map(|v| v.ok()) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            f(Entry {
                name,
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        Ok(())
    }
}
