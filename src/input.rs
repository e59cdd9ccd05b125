//! Operator keyboard input
//!
//! Keys are read from the terminal in raw mode on a dedicated thread and
//! forwarded to the control loop as [`OperatorEvent`]s.
//!
//! | Key | Event |
//! |-----|-------|
//! | `q`, Ctrl-C | quit |
//! | `p` | pause / resume autonomous |
//! | `m` | toggle manual |
//! | `w` / `s` | manual throttle up / down |
//! | `a` / `d` | manual steering left / right |
//! | `[` / `]` | manual omega down / up |
//! | space | emergency stop |
//! | `t` | switch detector |
//! | `c` | recalibrate colour from frame centre |

use crate::error::{LakshyaError, Result};
use crate::orchestrator::OperatorEvent;
use crate::shared::SharedState;
use crossbeam_channel::Sender;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Translate a key press into an operator event
pub fn map_key(key: &KeyEvent) -> Option<OperatorEvent> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(OperatorEvent::Quit);
    }

    let event = match key.code {
        KeyCode::Char('q') | KeyCode::Esc => OperatorEvent::Quit,
        KeyCode::Char('p') => OperatorEvent::TogglePause,
        KeyCode::Char('m') => OperatorEvent::ToggleManual,
        KeyCode::Char('w') | KeyCode::Up => OperatorEvent::throttle(1),
        KeyCode::Char('s') | KeyCode::Down => OperatorEvent::throttle(-1),
        KeyCode::Char('a') | KeyCode::Left => OperatorEvent::steering(-1),
        KeyCode::Char('d') | KeyCode::Right => OperatorEvent::steering(1),
        KeyCode::Char('[') => OperatorEvent::omega(-1),
        KeyCode::Char(']') => OperatorEvent::omega(1),
        KeyCode::Char(' ') => OperatorEvent::EmergencyStop,
        KeyCode::Char('t') => OperatorEvent::SwitchDetector,
        KeyCode::Char('c') => OperatorEvent::RecalibrateColor,
        _ => return None,
    };
    Some(event)
}

/// Keeps the terminal in raw mode while alive
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> Result<Self> {
        enable_raw_mode().map_err(|e| LakshyaError::Terminal(e.to_string()))?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            tracing::error!("Failed to restore terminal: {}", e);
        }
    }
}

/// Read keys until quit or shutdown, forwarding events to `tx`.
pub fn spawn_input_thread(
    tx: Sender<OperatorEvent>,
    shared: Arc<SharedState>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("input".into())
        .spawn(move || {
            if let Err(e) = input_loop(&tx, &shared) {
                tracing::error!("Keyboard input stopped: {}", e);
            }
        })?;
    Ok(handle)
}

fn input_loop(tx: &Sender<OperatorEvent>, shared: &SharedState) -> Result<()> {
    while !shared.should_shutdown() {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        if let Event::Key(key) = event::read()?
            && key.kind != KeyEventKind::Release
            && let Some(ev) = map_key(&key)
        {
            tracing::debug!("Key {:?} -> {:?}", key.code, ev);
            if tx.send(ev).is_err() || ev == OperatorEvent::Quit {
                break;
            }
        }
    }
    Ok(())
}
