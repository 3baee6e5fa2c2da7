//! sliding cache of file bytes about the playhead

use crate::{FileHandler, CHUNK_LEN};
use embedded_io::SeekFrom;

#[allow(unused_imports)]
use micromath::F32Ext;

pub struct ScrubWindow<'b> {
    /// sample buffer
    samples: &'b mut [i16],
    /// file byte offset of `samples[0]`; always even
    reference: u64,
    /// bytes obtained from storage by the last refill
    filled: usize,
}

impl<'b> ScrubWindow<'b> {
    pub fn new(samples: &'b mut [i16]) -> Self {
        samples.fill(0);
        Self {
            samples,
            reference: 0,
            filled: 0,
        }
    }

    /// capacity in bytes
    pub fn byte_len(&self) -> u64 {
        self.samples.len() as u64 * 2
    }

    pub fn reference(&self) -> u64 {
        self.reference
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn samples(&self) -> &[i16] {
        self.samples
    }

    /// true if byte position `pos` lies in `[reference, reference + byte_len)`
    pub fn contains(&self, pos: f64) -> bool {
        pos >= self.reference as f64 && pos < (self.reference + self.byte_len()) as f64
    }

    pub fn reset(&mut self) {
        self.reference = 0;
        self.filled = 0;
        self.samples.fill(0);
    }

    /// even reference that centers `playhead`, pulled back so the window stays inside the file
    pub fn reference_for(&self, playhead: f64, file_len: u64) -> u64 {
        let half = self.byte_len() / 2;
        let candidate = (playhead.max(0.) as u64).saturating_sub(half) & !1;
        candidate.min(file_len.saturating_sub(self.byte_len())) & !1
    }

    /// Re-center the window on `playhead` and read it back from storage.
    ///
    /// Reads go out in `CHUNK_LEN` pieces and stop at the first short read; everything past the
    /// bytes actually obtained is zeroed. A failed seek leaves the whole window silent.
    pub fn refill<F: FileHandler>(
        &mut self,
        fs: &mut F,
        file: &mut F::File,
        file_len: u64,
        playhead: f64,
    ) {
        self.reference = self.reference_for(playhead, file_len);
        self.filled = 0;

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.samples[..]);
        if fs.seek(file, SeekFrom::Start(self.reference)).is_err() {
            warn!("window seek to {} failed", self.reference);
            bytes.fill(0);
            return;
        }
        let want = (file_len - self.reference).min(bytes.len() as u64) as usize;
        while self.filled < want {
            let len = (want - self.filled).min(CHUNK_LEN);
            let n = fs
                .read(file, &mut bytes[self.filled..][..len])
                .unwrap_or(0)
                .min(len);
            self.filled += n;
            if n < len {
                debug!("short read at {}", self.reference + self.filled as u64);
                break;
            }
        }
        bytes[self.filled..].fill(0);
        // file samples are little endian
        for sample in self.samples.iter_mut() {
            *sample = i16::from_le(*sample);
        }
        trace!("window at {} with {} bytes", self.reference, self.filled);
    }

    /// sample at byte position `pos`, linearly interpolated; silence outside the window
    pub fn sample_at(&self, pos: f64) -> i16 {
        if !self.contains(pos) {
            return 0;
        }
        let index = ((pos - self.reference as f64) / 2.) as f32;
        let i = index as usize;
        let word_a = self.samples[i] as f32;
        let word_b = self.samples.get(i + 1).copied().unwrap_or(self.samples[i]) as f32;
        (word_a + (word_b - word_a) * index.fract()) as i16
    }
}
