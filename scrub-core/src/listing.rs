//! playable file discovery

use crate::FileHandler;

/// true for names ending in `.wav` or `.raw`, any case
pub fn is_audio_file(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 4 {
        return false;
    }
    let ext = &bytes[bytes.len() - 4..];
    ext.eq_ignore_ascii_case(b".wav") || ext.eq_ignore_ascii_case(b".raw")
}

/// Sorted names of the playable files in one directory.
///
/// Holds at most `N` names of at most `LEN` bytes; anything beyond either bound is skipped.
#[derive(Default)]
pub struct FileList<const N: usize, const LEN: usize> {
    names: heapless::Vec<heapless::String<LEN>, N>,
}

impl<const N: usize, const LEN: usize> FileList<N, LEN> {
    pub fn new() -> Self {
        Self {
            names: heapless::Vec::new(),
        }
    }

    /// Replace the contents with the playable files of `dir`, returning how many were kept.
    pub fn scan<F: FileHandler>(&mut self, fs: &mut F, dir: &str) -> Result<usize, F::Error> {
        self.names.clear();
        let mut skipped = 0usize;
        let names = &mut self.names;
        fs.iterate_dir(dir, |entry| {
            if entry.is_dir || !is_audio_file(entry.name) {
                return;
            }
            let mut name = heapless::String::new();
            if name.push_str(entry.name).is_err() || names.push(name).is_err() {
                skipped += 1;
            }
        })?;
        if skipped > 0 {
            warn!("{} files skipped in {}", skipped, dir);
        }
        self.names
            .sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
        debug!("{} files in {}", self.names.len(), dir);
        Ok(self.names.len())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|v| v.as_str())
    }
}
