//! in-memory storage and recording bus for tests

use crate::{Bus, Entry, FileHandler};
use embedded_io::{ErrorKind, ErrorType, SeekFrom};
use std::{collections::BTreeMap, string::String, vec::Vec};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Suspend,
    Resume,
    Release,
    Acquire,
}

#[derive(Default)]
pub struct MockBus {
    pub events: Vec<BusEvent>,
}

impl MockBus {
    /// current preemption mask depth
    pub fn depth(&self) -> i32 {
        self.events.iter().fold(0, |acc, v| match v {
            BusEvent::Suspend => acc + 1,
            BusEvent::Resume => acc - 1,
            _ => acc,
        })
    }

    pub fn count(&self, event: BusEvent) -> usize {
        self.events.iter().filter(|v| **v == event).count()
    }
}

impl Bus for MockBus {
    fn suspend(&mut self) {
        self.events.push(BusEvent::Suspend);
    }

    fn resume(&mut self) {
        self.events.push(BusEvent::Resume);
    }

    fn release_for_storage(&mut self) {
        self.events.push(BusEvent::Release);
    }

    fn acquire_for_audio(&mut self) {
        self.events.push(BusEvent::Acquire);
    }
}

pub struct MemFile {
    data: Vec<u8>,
    pos: u64,
}

/// flat in-memory file system; paths are looked up verbatim
#[derive(Default)]
pub struct MemFs {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: Vec<String>,
    /// cap on bytes returned per read call
    pub read_cap: Option<usize>,
    pub fail_remount: bool,
    pub fail_seek: bool,
    pub fail_close: bool,
    /// total close calls issued
    pub closes: usize,
    /// total read calls issued
    pub reads: usize,
}

impl MemFs {
    pub fn with(path: &str, data: Vec<u8>) -> Self {
        let mut fs = Self::default();
        fs.files.insert(path.into(), data);
        fs
    }
}

impl ErrorType for MemFs {
    type Error = ErrorKind;
}

impl FileHandler for MemFs {
    type File = MemFile;

    fn remount(&mut self) -> Result<(), Self::Error> {
        if self.fail_remount {
            Err(ErrorKind::Other)
        } else {
            Ok(())
        }
    }

    fn open(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        let data = self.files.get(path).ok_or(ErrorKind::NotFound)?;
        Ok(MemFile {
            data: data.clone(),
            pos: 0,
        })
    }

    fn close(&mut self, _file: Self::File) -> Result<(), Self::Error> {
        self.closes += 1;
        if self.fail_close {
            Err(ErrorKind::Other)
        } else {
            Ok(())
        }
    }

    fn len(&mut self, file: &mut Self::File) -> Result<u64, Self::Error> {
        Ok(file.data.len() as u64)
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.reads += 1;
        let start = (file.pos as usize).min(file.data.len());
        let mut n = buf.len().min(file.data.len() - start);
        if let Some(cap) = self.read_cap {
            n = n.min(cap);
        }
        buf[..n].copy_from_slice(&file.data[start..start + n]);
        file.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, file: &mut Self::File, pos: SeekFrom) -> Result<u64, Self::Error> {
        if self.fail_seek {
            return Err(ErrorKind::Other);
        }
        let len = file.data.len() as i64;
        let new = match pos {
            SeekFrom::Start(v) => v as i64,
            SeekFrom::Current(v) => file.pos as i64 + v,
            SeekFrom::End(v) => len + v,
        };
        if new < 0 || new > len {
            return Err(ErrorKind::InvalidInput);
        }
        file.pos = new as u64;
        Ok(file.pos)
    }

    fn iterate_dir<C: FnMut(Entry<'_>)>(&mut self, _path: &str, mut f: C) -> Result<(), Self::Error> {
        for name in self.dirs.iter() {
            f(Entry {
                name: name.as_str(),
                is_dir: true,
            });
        }
        for name in self.files.keys() {
            f(Entry {
                name: name.as_str(),
                is_dir: false,
            });
        }
        Ok(())
    }
}

/// canonical 44-byte header followed by `pcm`
pub fn wav(channels: u16, sample_rate: u32, bits: u16, pcm: &[u8]) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
    bytes.extend_from_slice(pcm);
    bytes
}

/// file bytes where every sample equals its own sample index
pub fn ramp(samples: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| (i as i16).to_le_bytes())
        .collect()
}
