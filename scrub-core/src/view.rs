//! waveform layout and playback cursor tracking

/// vertical line of one waveform column, in rows from the top of the area
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bar {
    pub top: u16,
    pub len: u16,
}

/// Peak table laid out over a `width` x `height` area, one peak per column.
pub struct Waveform<'p> {
    peaks: &'p [u16],
    width: usize,
    height: u16,
    max: u16,
}

impl<'p> Waveform<'p> {
    pub fn new(peaks: &'p [u16], width: usize, height: u16) -> Self {
        let max = peaks
            .iter()
            .take(width)
            .copied()
            .max()
            .unwrap_or(0);
        Self {
            peaks,
            width,
            height,
            max,
        }
    }

    /// loudest peak among the visible columns
    pub fn max(&self) -> u16 {
        self.max
    }

    /// columns that carry a peak
    pub fn columns(&self) -> usize {
        self.peaks.len().min(self.width)
    }

    /// Bar for `column`, centered and scaled so the loudest peak spans the full height.
    ///
    /// None for blank columns: past the peaks, zero height, or an all-silent table.
    pub fn bar(&self, column: usize) -> Option<Bar> {
        if self.max == 0 || column >= self.columns() {
            return None;
        }
        let len = (self.peaks[column] as u32 * self.height as u32 / self.max as u32) as u16;
        if len == 0 {
            return None;
        }
        Some(Bar {
            top: self.height / 2 - len / 2,
            len,
        })
    }
}

/// Peak column holding byte position `playhead`, for peaks of `peak_len` bytes each starting at
/// `data_start`.
///
/// None when the position falls past the last of `columns` peaks, which happens when the peak
/// table filled up before the end of the file.
pub fn column_for(playhead: f64, data_start: u64, peak_len: u64, columns: usize) -> Option<usize> {
    if peak_len == 0 || columns == 0 {
        return None;
    }
    let offset = (playhead - data_start as f64).max(0.);
    let column = (offset / peak_len as f64) as usize;
    (column < columns).then_some(column)
}

/// columns to repaint after the cursor moved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Move {
    /// column to restore to its waveform bar
    pub prev: Option<usize>,
    /// column to draw the cursor on
    pub next: Option<usize>,
}

#[derive(Default)]
pub struct Cursor {
    column: Option<usize>,
}

impl Cursor {
    pub fn column(&self) -> Option<usize> {
        self.column
    }

    /// Move the cursor to `column`; Some only when that changes the column.
    pub fn update(&mut self, column: Option<usize>) -> Option<Move> {
        if column == self.column {
            return None;
        }
        let prev = core::mem::replace(&mut self.column, column);
        Some(Move { prev, next: column })
    }
}
