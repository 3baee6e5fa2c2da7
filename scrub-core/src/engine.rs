//! playback state machine driven by the real-time tick

use crate::{open_error, Bus, Error, FileHandler, ScrubWindow, StorageAccess, PATH_LEN};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// playhead advances by itself at `speed`
    Continuous,
    /// playhead follows the target every tick
    Scrub,
    #[default]
    Stopped,
}

/// Entry point handed to the real-time runtime, called once per output block.
pub trait AudioCallback {
    /// Fill `block` with the next samples. Never fails; anything that cannot be produced is
    /// written as silence.
    fn update(&mut self, block: &mut [i16]);
}

struct AudioFile<F: FileHandler> {
    file: F::File,
    /// length in bytes
    len: u64,
    name: heapless::String<PATH_LEN>,
}

pub struct Engine<'b, F: FileHandler, B: Bus> {
    fs: F,
    bus: B,
    file: Option<AudioFile<F>>,
    window: ScrubWindow<'b>,
    /// fractional byte position
    playhead: f64,
    /// scrub destination in bytes
    target: f64,
    mode: Mode,
    speed: f32,
    /// transport currently held for audio output
    held: bool,
}

impl<'b, F: FileHandler, B: Bus> Engine<'b, F, B> {
    pub fn new(fs: F, bus: B, window: &'b mut [i16]) -> Self {
        Self {
            fs,
            bus,
            file: None,
            window: ScrubWindow::new(window),
            playhead: 0.,
            target: 0.,
            mode: Mode::Stopped,
            speed: 1.,
            held: false,
        }
    }

    /// storage access for foreground work (listing, peak analysis) between ticks
    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn window(&self) -> &ScrubWindow<'b> {
        &self.window
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.mode != Mode::Stopped
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// open file length in bytes, 0 if none
    pub fn file_len(&self) -> u64 {
        self.file.as_ref().map(|v| v.len).unwrap_or(0)
    }

    /// open file name, empty if none
    pub fn filename(&self) -> &str {
        self.file.as_ref().map(|v| v.name.as_str()).unwrap_or("")
    }

    /// Switch mode, taking or handing back the transport on Stopped <-> active transitions only.
    ///
    /// Without an open file every mode collapses to Stopped.
    pub fn set_mode(&mut self, mode: Mode) {
        let mode = if self.file.is_some() {
            mode
        } else {
            Mode::Stopped
        };
        if mode != self.mode {
            debug!("mode {} -> {}", self.mode as u8, mode as u8);
        }
        self.mode = mode;
        if mode == Mode::Stopped {
            if self.held {
                self.bus.release_for_storage();
                self.held = false;
            }
        } else if !self.held {
            self.bus.acquire_for_audio();
            self.held = true;
        }
    }

    /// inactive always stops; active without a playing mode defaults to scrub
    pub fn activate(&mut self, active: bool, mode: Mode) {
        match (active, mode) {
            (false, _) => self.set_mode(Mode::Stopped),
            (true, Mode::Stopped) => self.set_mode(Mode::Scrub),
            (true, mode) => self.set_mode(mode),
        }
    }

    /// Load `path` in place of the current file.
    ///
    /// Passes through Stopped to open; on success the previous mode comes back, on any failure
    /// the engine stays Stopped with no file.
    pub fn set_file(&mut self, path: &str) -> Result<(), Error<F::Error>> {
        let prev = self.mode;
        self.stop();
        match self.open(path) {
            Ok(()) => {
                info!("loaded {} ({} bytes)", path, self.file_len());
                if prev != Mode::Stopped {
                    self.set_mode(prev);
                }
                Ok(())
            }
            Err(e) => {
                warn!("load {} failed", path);
                self.stop();
                Err(e)
            }
        }
    }

    fn open(&mut self, path: &str) -> Result<(), Error<F::Error>> {
        self.fs.remount().map_err(Error::StorageUnavailable)?;
        let mut file = self.fs.open(path).map_err(open_error)?;
        let len = match self.fs.len(&mut file) {
            Ok(0) => {
                self.close(file);
                return Err(Error::EmptyFile);
            }
            Ok(len) => len,
            Err(e) => {
                self.close(file);
                return Err(Error::OpenFailed(e));
            }
        };
        let mut name = heapless::String::new();
        for c in path.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        // stopped, so the transport is free for storage
        self.window.refill(&mut self.fs, &mut file, len, 0.);
        self.file = Some(AudioFile { file, len, name });
        Ok(())
    }

    fn close(&mut self, file: F::File) {
        if self.fs.close(file).is_err() {
            warn!("close failed");
        }
    }

    /// scrub destination as a fraction of the file, clamped to `[0, 1]`
    pub fn set_target(&mut self, target: f32) {
        let target = if target.is_nan() {
            0.
        } else {
            target.clamp(0., 1.)
        };
        let len = self.file_len();
        self.target = clamp_to_file(target as f64 * len as f64, len);
    }

    pub fn set_speed(&mut self, speed: f32) {
        if speed.is_finite() {
            self.speed = speed;
        }
    }

    /// stop, close the file and rewind all position state
    pub fn stop(&mut self) {
        self.set_mode(Mode::Stopped);
        if let Some(audio) = self.file.take() {
            self.close(audio.file);
        }
        self.playhead = 0.;
        self.target = 0.;
        self.window.reset();
    }
}

impl<F: FileHandler, B: Bus> AudioCallback for Engine<'_, F, B> {
    fn update(&mut self, block: &mut [i16]) {
        let Some(audio) = self.file.as_mut() else {
            block.fill(0);
            return;
        };
        let len = audio.len as f64;
        let step = match self.mode {
            Mode::Stopped => {
                block.fill(0);
                return;
            }
            Mode::Continuous => 2. * self.speed as f64,
            Mode::Scrub => {
                self.playhead = clamp_to_file(self.target, audio.len);
                2.
            }
        };
        // one refill per tick at most, the playhead first; whatever still misses stays silent
        let mut refilled = false;
        if !self.window.contains(self.playhead) {
            let _access = StorageAccess::new(&mut self.bus, self.held);
            self.window
                .refill(&mut self.fs, &mut audio.file, audio.len, self.playhead);
            refilled = true;
        }
        for (i, sample) in block.iter_mut().enumerate() {
            let pos = self.playhead + i as f64 * step;
            let pos = match self.mode {
                Mode::Continuous => wrap(pos, len),
                // a scrub block runs off the end rather than into the start
                _ if pos >= len => {
                    *sample = 0;
                    continue;
                }
                _ => pos,
            };
            if !refilled && !self.window.contains(pos) {
                let _access = StorageAccess::new(&mut self.bus, self.held);
                self.window
                    .refill(&mut self.fs, &mut audio.file, audio.len, pos);
                refilled = true;
            }
            *sample = self.window.sample_at(pos);
        }
        if self.mode == Mode::Continuous {
            self.playhead = wrap(self.playhead + block.len() as f64 * step, len);
        }
    }
}

/// clamp to the last whole sample of a `len` byte file
fn clamp_to_file(pos: f64, len: u64) -> f64 {
    if len <= 2 {
        0.
    } else {
        pos.clamp(0., (len - 2) as f64)
    }
}

/// `pos` modulo `len`, always in `[0, len)`
fn wrap(pos: f64, len: f64) -> f64 {
    let rem = pos - (pos / len) as i64 as f64 * len;
    let rem = if rem < 0. { rem + len } else { rem };
    if rem >= len {
        0.
    } else {
        rem
    }
}
