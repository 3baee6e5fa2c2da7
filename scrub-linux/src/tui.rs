use crate::{
    audio::{Cmd, Status},
    fs::StdFileHandler,
};

use color_eyre::eyre::Result;
use crossterm::event::{self, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Stylize},
    text::{Line, Text},
    widgets::{Block, Padding, Paragraph, Widget},
    DefaultTerminal, Frame,
};
use scrub_core::{
    view::{column_for, Cursor, Waveform},
    FileList, Mode, PATH_LEN, WAVEFORM_WIDTH,
};
use std::sync::{
    mpsc::{Receiver, Sender},
    Arc, Mutex,
};

pub const FILE_COUNT: usize = 64;
const LOG_DURATION: std::time::Duration = std::time::Duration::from_millis(1000);
const TARGET_STEP: f32 = 0.01;
const SPEED_STEP: f32 = 0.25;

/// Forwards log records to the one-line log of the UI.
pub struct TuiLogger {
    tx: Mutex<Sender<String>>,
}

impl TuiLogger {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    pub fn install(self) -> Result<()> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(log::LevelFilter::Info);
        Ok(())
    }
}

impl log::Log for TuiLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(format!("{}", record.args()));
        }
    }

    fn flush(&self) {}
}

pub struct TuiHandler {
    /// listing and peak analysis, kept apart from the engine's handle
    fs: StdFileHandler,
    files: FileList<FILE_COUNT, PATH_LEN>,
    selected: usize,

    peaks: Vec<u16>,
    peak_count: usize,
    /// first sample byte of the loaded file
    data_start: u64,
    /// file bytes folded into each peak
    peak_len: u64,
    /// columns available for the waveform
    width: usize,
    cursor: Cursor,

    /// mode resumed by play
    last_mode: Mode,
    target: f32,
    speed: f32,
    log: Option<(std::time::Instant, String)>,

    cmd_tx: Sender<Cmd>,
    status: Arc<Status>,
}

impl TuiHandler {
    pub fn new(fs: StdFileHandler, cmd_tx: Sender<Cmd>, status: Arc<Status>) -> Result<Self> {
        let mut ret = Self {
            fs,
            files: FileList::new(),
            selected: 0,

            peaks: vec![0; WAVEFORM_WIDTH],
            peak_count: 0,
            data_start: 0,
            peak_len: 0,
            width: WAVEFORM_WIDTH,
            cursor: Cursor::default(),

            last_mode: Mode::Scrub,
            target: 0.,
            speed: 1.,
            log: None,

            cmd_tx,
            status,
        };
        ret.rescan()?;
        Ok(ret)
    }

    fn send(&self, cmd: Cmd) -> Result<()> {
        self.cmd_tx.send(cmd)?;
        Ok(())
    }

    fn rescan(&mut self) -> Result<()> {
        let count = self.files.scan(&mut self.fs, "")?;
        self.selected = self.selected.min(count.saturating_sub(1));
        Ok(())
    }

    fn say(&mut self, msg: impl Into<String>) {
        self.log = Some((std::time::Instant::now(), msg.into()));
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal, log_rx: Receiver<String>) -> Result<()> {
        self.resize(terminal.size()?.width);
        terminal.draw(|frame| self.draw(frame))?;
        loop {
            let mut flush = false;
            if let Some((start, ..)) = &self.log {
                if start.elapsed() >= LOG_DURATION {
                    self.log = None;
                    flush = true;
                }
            };
            if crossterm::event::poll(std::time::Duration::from_millis(16))? {
                match event::read()? {
                    event::Event::Key(KeyEvent {
                        code,
                        kind: KeyEventKind::Press,
                        ..
                    }) => {
                        if self.key(code)? {
                            break;
                        }
                    }
                    event::Event::Resize(width, _) => self.resize(width),
                    _ => (),
                }
                flush = true;
            }
            match log_rx.try_recv() {
                Ok(msg) => {
                    self.say(msg);
                    flush = true;
                }
                Err(std::sync::mpsc::TryRecvError::Empty) => (),
                Err(e) => Err(e)?,
            }
            if self.track() {
                flush = true;
            }
            if flush {
                terminal.draw(|frame| self.draw(frame))?;
            }
        }
        Ok(())
    }

    fn resize(&mut self, width: u16) {
        // file list and waveform borders
        self.width = (width.saturating_sub(LIST_WIDTH + 2) as usize).max(1);
    }

    /// move the cursor along with the playhead; true if it changed column
    fn track(&mut self) -> bool {
        let column = if self.status.file_len() > 0 {
            column_for(
                self.status.playhead(),
                self.data_start,
                self.peak_len,
                self.peak_count,
            )
        } else {
            None
        };
        self.cursor.update(column).is_some()
    }

    /// returns true if should exit
    pub fn key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.selected + 1 < self.files.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => self.load()?,
            KeyCode::Char('R') => {
                self.rescan()?;
                self.say(format!("{} files", self.files.len()));
            }
            KeyCode::Char('s') => self.play(Mode::Scrub)?,
            KeyCode::Char('l') => self.play(Mode::Continuous)?,
            KeyCode::Char(' ') => self.send(Cmd::Toggle(self.last_mode))?,
            KeyCode::Char('x') => {
                self.send(Cmd::Stop)?;
                self.peak_count = 0;
                self.target = 0.;
            }
            KeyCode::Left => self.nudge(-TARGET_STEP)?,
            KeyCode::Right => self.nudge(TARGET_STEP)?,
            KeyCode::Char('+') => self.offset_speed(SPEED_STEP)?,
            KeyCode::Char('-') => self.offset_speed(-SPEED_STEP)?,
            KeyCode::Char('r') => {
                self.speed = -self.speed;
                self.send(Cmd::SetSpeed(self.speed))?;
            }
            _ => (),
        }
        Ok(false)
    }

    fn play(&mut self, mode: Mode) -> Result<()> {
        self.last_mode = mode;
        self.send(Cmd::SetMode(mode))
    }

    fn nudge(&mut self, step: f32) -> Result<()> {
        self.target = (self.target + step).clamp(0., 1.);
        self.send(Cmd::SetTarget(self.target))
    }

    fn offset_speed(&mut self, step: f32) -> Result<()> {
        self.speed += step;
        self.send(Cmd::SetSpeed(self.speed))
    }

    fn load(&mut self) -> Result<()> {
        let Some(name) = self.files.get(self.selected).map(String::from) else {
            self.say("no files found </3");
            return Ok(());
        };
        // open failures come back through the log from the audio thread
        self.send(Cmd::SetFile(name.clone()))?;
        self.target = 0.;
        self.peaks.resize(self.width, 0);
        match scrub_core::analyze_with_header(&mut self.fs, &name, self.width, &mut self.peaks) {
            Ok((header, count)) => {
                self.peak_count = count;
                self.data_start = header.data_start;
                self.peak_len = header.peak_len(self.width);
            }
            Err(e) => {
                // raw files play fine, they just have no header to draw from
                log::warn!("{}: {}", name, e);
                self.peak_count = 0;
            }
        }
        self.say(format!("load {}", name));
        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn render_log(&self, area: Rect, buf: &mut Buffer) {
        if let Some((_, msg)) = &self.log {
            Paragraph::new(Text::raw(msg)).centered().render(area, buf);
        }
    }

    fn render_status(&self, area: Rect, buf: &mut Buffer) {
        let status = &self.status;
        let mode = match status.mode() {
            Mode::Continuous => "loop",
            Mode::Scrub => "scrub",
            Mode::Stopped => "stop",
        };
        let text = format!(
            "{:<5} speed {:>5.2}  {:>10}/{:<10}  refills {}",
            mode,
            status.speed(),
            status.playhead() as u64,
            status.file_len(),
            status.refills(),
        );
        Paragraph::new(Text::raw(text)).centered().render(area, buf);
    }

    fn render_files(&self, area: Rect, buf: &mut Buffer) {
        let text = if self.files.is_empty() {
            Text::raw("no files found </3")
        } else {
            // keep the selection in view
            let rows = area.height.saturating_sub(2) as usize;
            let skip = (self.selected + 1).saturating_sub(rows.max(1));
            Text::from(
                self.files
                    .iter()
                    .enumerate()
                    .skip(skip)
                    .map(|(i, name)| {
                        if i == self.selected {
                            Line::raw(name).reversed()
                        } else {
                            Line::raw(name)
                        }
                    })
                    .collect::<Vec<_>>(),
            )
        };
        Paragraph::new(text)
            .left_aligned()
            .block(
                Block::bordered()
                    .title(" files ")
                    .padding(Padding::horizontal(1)),
            )
            .render(area, buf);
    }

    fn render_waveform(&self, area: Rect, buf: &mut Buffer) {
        let block = Block::bordered().bold().title(" waveform ");
        let inner = block.inner(area);
        block.render(area, buf);
        let count = if self.status.file_len() > 0 {
            self.peak_count
        } else {
            0
        };
        WaveformView {
            peaks: &self.peaks[..count],
            cursor: self.cursor.column(),
        }
        .render(inner, buf);
    }
}

const LIST_WIDTH: u16 = 28;

struct WaveformView<'a> {
    peaks: &'a [u16],
    cursor: Option<usize>,
}

impl Widget for WaveformView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let waveform = Waveform::new(self.peaks, area.width as usize, area.height);
        for x in 0..area.width {
            if self.cursor == Some(x as usize) {
                for y in 0..area.height {
                    if let Some(cell) = buf.cell_mut((area.x + x, area.y + y)) {
                        cell.set_symbol("│").set_fg(Color::Blue);
                    }
                }
                continue;
            }
            let Some(bar) = waveform.bar(x as usize) else {
                continue;
            };
            for y in bar.top..bar.top + bar.len {
                if let Some(cell) = buf.cell_mut((area.x + x, area.y + y)) {
                    cell.set_symbol("█");
                }
            }
        }
    }
}

impl Widget for &TuiHandler {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let [status_area, area, log_area] =
            Layout::vertical([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1)])
                .areas(area);
        let [files_area, waveform_area] =
            Layout::horizontal([Constraint::Length(LIST_WIDTH), Constraint::Min(3)]).areas(area);
        self.render_status(status_area, buf);
        self.render_files(files_area, buf);
        self.render_waveform(waveform_area, buf);
        self.render_log(log_area, buf);
    }
}
