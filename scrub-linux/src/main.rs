mod audio;
mod fs;
mod tui;

use color_eyre::eyre::{eyre, Result};
use std::sync::Arc;

fn main() -> Result<()> {
    color_eyre::install()?;

    let dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    if !std::path::Path::new(&dir).is_dir() {
        return Err(eyre!("{} is not a directory", dir));
    }

    let (log_tx, log_rx) = std::sync::mpsc::channel();
    tui::TuiLogger::new(log_tx).install()?;

    // lives as long as the process, like the static window on a board
    let window: &'static mut [i16] =
        Box::leak(vec![0i16; scrub_core::WINDOW_LEN].into_boxed_slice());
    let status = Arc::new(audio::Status::new());
    let engine = audio::Engine::new(
        fs::StdFileHandler::new(&dir),
        audio::HostBus::new(status.clone()),
        window,
    );
    let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
    let _stream = audio::start(audio::Player::new(engine, cmd_rx))?;

    let mut tui = tui::TuiHandler::new(fs::StdFileHandler::new(&dir), cmd_tx, status)?;
    let mut terminal = ratatui::init();
    let res = tui.run(&mut terminal, log_rx);
    ratatui::restore();
    res
}
