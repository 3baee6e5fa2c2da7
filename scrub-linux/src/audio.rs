use color_eyre::eyre::{eyre, OptionExt, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, SampleFormat, SizedSample,
};
use scrub_core::{AudioCallback, Mode, BLOCK_LEN};
use std::sync::{
    atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering},
    mpsc::Receiver,
    Arc,
};

pub type Engine = scrub_core::Engine<'static, crate::fs::StdFileHandler, HostBus>;

/// Requests from the foreground, applied at the start of the next block.
#[derive(Debug)]
pub enum Cmd {
    SetFile(String),
    SetMode(Mode),
    /// stop if playing, otherwise resume in the given mode
    Toggle(Mode),
    SetTarget(f32),
    SetSpeed(f32),
    Stop,
}

/// Engine state published by the audio thread after every block.
#[derive(Debug, Default)]
pub struct Status {
    playhead: AtomicU64,
    target: AtomicU64,
    file_len: AtomicU64,
    mode: AtomicU8,
    speed: AtomicU32,
    refills: AtomicUsize,
}

impl Status {
    pub fn new() -> Self {
        let ret = Self::default();
        ret.mode.store(Mode::Stopped as u8, Ordering::Relaxed);
        ret.speed.store(1f32.to_bits(), Ordering::Relaxed);
        ret
    }

    pub fn playhead(&self) -> f64 {
        f64::from_bits(self.playhead.load(Ordering::Relaxed))
    }

    pub fn target(&self) -> f64 {
        f64::from_bits(self.target.load(Ordering::Relaxed))
    }

    pub fn file_len(&self) -> u64 {
        self.file_len.load(Ordering::Relaxed)
    }

    pub fn mode(&self) -> Mode {
        match self.mode.load(Ordering::Relaxed) {
            0 => Mode::Continuous,
            1 => Mode::Scrub,
            _ => Mode::Stopped,
        }
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed.load(Ordering::Relaxed))
    }

    /// window refills done while the transport was held
    pub fn refills(&self) -> usize {
        self.refills.load(Ordering::Relaxed)
    }

    fn publish(&self, engine: &Engine) {
        self.playhead
            .store(engine.playhead().to_bits(), Ordering::Relaxed);
        self.target.store(engine.target().to_bits(), Ordering::Relaxed);
        self.file_len.store(engine.file_len(), Ordering::Relaxed);
        self.mode.store(engine.mode() as u8, Ordering::Relaxed);
        self.speed.store(engine.speed().to_bits(), Ordering::Relaxed);
    }
}

/// Host side of the transport hand-off.
///
/// Audio and storage never share a wire here, so hand-offs only count refills for the status
/// line. The engine suspends output only around a refill, which is what gets counted.
pub struct HostBus {
    status: Arc<Status>,
}

impl HostBus {
    pub fn new(status: Arc<Status>) -> Self {
        Self { status }
    }
}

impl scrub_core::Bus for HostBus {
    fn suspend(&mut self) {
        self.status.refills.fetch_add(1, Ordering::Relaxed);
    }

    fn resume(&mut self) {}

    fn release_for_storage(&mut self) {}

    fn acquire_for_audio(&mut self) {}
}

/// Owns the engine on the audio thread and adapts its fixed blocks to whatever buffer length
/// the device asks for.
pub struct Player {
    engine: Engine,
    cmd_rx: Receiver<Cmd>,
    status: Arc<Status>,
    block: [i16; BLOCK_LEN],
    /// next unplayed sample in `block`
    index: usize,
}

impl Player {
    pub fn new(engine: Engine, cmd_rx: Receiver<Cmd>) -> Self {
        let status = engine.bus().status.clone();
        status.publish(&engine);
        Self {
            engine,
            cmd_rx,
            status,
            block: [0; BLOCK_LEN],
            index: BLOCK_LEN,
        }
    }

    /// Fill an interleaved buffer, mono duplicated to every channel.
    pub fn fill<T>(&mut self, buffer: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<i16>,
    {
        for frame in buffer.chunks_mut(channels) {
            if self.index >= BLOCK_LEN {
                self.pull();
            }
            let sample = T::from_sample(self.block[self.index]);
            self.index += 1;
            frame.fill(sample);
        }
    }

    fn pull(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                Cmd::SetFile(path) => {
                    if let Err(e) = self.engine.set_file(&path) {
                        log::warn!("{}: {}", path, e);
                    }
                }
                Cmd::SetMode(mode) => self.engine.set_mode(mode),
                Cmd::Toggle(mode) => {
                    if self.engine.is_playing() {
                        self.engine.set_mode(Mode::Stopped);
                    } else {
                        self.engine.activate(true, mode);
                    }
                }
                Cmd::SetTarget(v) => self.engine.set_target(v),
                Cmd::SetSpeed(v) => self.engine.set_speed(v),
                Cmd::Stop => self.engine.stop(),
            }
        }
        self.engine.update(&mut self.block);
        self.status.publish(&self.engine);
        self.index = 0;
    }
}

fn build<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut player: Player,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| player.fill(data, channels),
        |e| log::error!("audio stream: {}", e),
        None,
    )?;
    Ok(stream)
}

/// Open the default output device and hand `player` to its callback.
pub fn start(player: Player) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_eyre("no default output device")?;
    let config = device.default_output_config()?;
    log::info!(
        "{} ch @ {} hz ({:?})",
        config.channels(),
        config.sample_rate().0,
        config.sample_format()
    );
    let stream = match config.sample_format() {
        SampleFormat::F32 => build::<f32>(&device, &config.into(), player)?,
        SampleFormat::I16 => build::<i16>(&device, &config.into(), player)?,
        SampleFormat::U16 => build::<u16>(&device, &config.into(), player)?,
        other => return Err(eyre!("unsupported sample format {:?}", other)),
    };
    stream.play()?;
    Ok(stream)
}
