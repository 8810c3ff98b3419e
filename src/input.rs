// Non-blocking keyboard input from the terminal
//
// The terminal is put in raw mode for as long as a `TerminalKeys` lives.
// Polls never wait. Toggle consumes one queued press per tick; Hold drains
// the queue and the most recent key wins.

use std::io::{Write, stdout};
use std::time::{Duration, Instant};

use crossterm::{
    cursor::{Hide, Show},
    event::{
        self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement},
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::translator::{Key, Policy};

/// Source of decoded keys, polled once per tick
pub trait KeySource {
    /// Most recent key for this tick, `None` when idle. Never blocks.
    fn poll_key(&mut self) -> Result<Option<Key>>;

    /// Give the terminal back in the state it was found. Idempotent.
    fn restore(&mut self) -> Result<()>;
}

/// Map a terminal key event to a [`Key`]
pub fn key_from_event(event: &KeyEvent) -> Key {
    match event.code {
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Esc => Key::Escape,
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Key::Interrupt,
        KeyCode::Char('h' | 'H') => Key::Home,
        KeyCode::Char('s' | 'S') => Key::SpeedUp,
        KeyCode::Char('d' | 'D') => Key::SpeedDown,
        _ => Key::Other,
    }
}

/// Tracks which key is physically held down.
///
/// With release reporting a key stays held until its release event. Without
/// it, a freshly pressed key is held for `repeat_delay` (the OS waits that
/// long before auto-repeating), then for `repeat_gap` past each repeat.
#[derive(Debug)]
struct HeldKey {
    releases_reported: bool,
    repeat_delay: Duration,
    repeat_gap: Duration,
    held: Option<Held>,
}

#[derive(Debug, Clone, Copy)]
struct Held {
    key: Key,
    seen: Instant,
    repeating: bool,
}

impl HeldKey {
    fn new(releases_reported: bool, repeat_delay: Duration, repeat_gap: Duration) -> Self {
        Self {
            releases_reported,
            repeat_delay,
            repeat_gap,
            held: None,
        }
    }

    fn on_event(&mut self, key: Key, kind: KeyEventKind, now: Instant) {
        self.expire(now);
        match kind {
            KeyEventKind::Press | KeyEventKind::Repeat => {
                // Terminals without event types report auto-repeat as presses
                let repeating =
                    kind == KeyEventKind::Repeat || self.held.is_some_and(|held| held.key == key);
                self.held = Some(Held {
                    key,
                    seen: now,
                    repeating,
                });
            }
            KeyEventKind::Release => {
                if self.held.is_some_and(|held| held.key == key) {
                    self.held = None;
                }
            }
        }
    }

    fn expire(&mut self, now: Instant) {
        if self.releases_reported {
            return;
        }
        if let Some(held) = self.held {
            let timeout = if held.repeating {
                self.repeat_gap
            } else {
                self.repeat_delay
            };
            if now.duration_since(held.seen) > timeout {
                self.held = None;
            }
        }
    }

    fn current(&mut self, now: Instant) -> Option<Key> {
        self.expire(now);
        self.held.map(|held| held.key)
    }
}

/// Turns the terminal's event queue into one key per tick
#[derive(Debug)]
struct KeyReader {
    policy: Policy,
    held: HeldKey,
}

impl KeyReader {
    /// Consume events from `next_event` for one tick.
    ///
    /// Toggle reads at most one press so every press flips a flag on its own
    /// tick. Hold drains the queue and reports the key held at `now`.
    fn read_tick<F>(&mut self, mut next_event: F, now: Instant) -> Result<Option<Key>>
    where
        F: FnMut() -> Result<Option<Event>>,
    {
        match self.policy {
            Policy::Toggle => {
                while let Some(event) = next_event()? {
                    if let Event::Key(key_event) = event {
                        if key_event.kind != KeyEventKind::Release {
                            return Ok(Some(key_from_event(&key_event)));
                        }
                    }
                }
                Ok(None)
            }
            Policy::Hold => {
                let mut latest = None;
                while let Some(event) = next_event()? {
                    let Event::Key(key_event) = event else {
                        continue;
                    };
                    let key = key_from_event(&key_event);
                    if key_event.kind != KeyEventKind::Release {
                        latest = Some(key);
                    }
                    self.held.on_event(key, key_event.kind, now);
                }
                // A press released within the same tick still counts once
                Ok(self.held.current(now).or(latest))
            }
        }
    }
}

/// Keyboard input from the controlling terminal (crossterm)
pub struct TerminalKeys {
    reader: KeyReader,
    enhanced: bool,
    raw: bool,
}

impl TerminalKeys {
    /// Enter raw mode and start reading keys for the configured policy
    pub fn acquire(config: &Config) -> Result<Self> {
        let policy = config.policy;
        let hold = |releases_reported| {
            HeldKey::new(releases_reported, config.repeat_delay(), config.hold_timeout())
        };

        enable_raw_mode().map_err(Error::Terminal)?;
        let mut keys = Self {
            reader: KeyReader {
                policy,
                held: hold(false),
            },
            enhanced: false,
            raw: true,
        };

        // From here on Drop restores the terminal if anything fails
        execute!(stdout(), Hide).map_err(Error::Terminal)?;

        if policy == Policy::Hold {
            if supports_keyboard_enhancement().unwrap_or(false) {
                execute!(
                    stdout(),
                    PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
                )
                .map_err(Error::Terminal)?;
                keys.enhanced = true;
                keys.reader.held = hold(true);
                debug!("Terminal reports key releases");
            } else {
                warn!(
                    "Terminal does not report key releases, a key counts as held for {}ms after a press and {}ms after each repeat",
                    config.repeat_delay_ms, config.hold_timeout_ms
                );
            }
        }

        info!("Keyboard input ready ({:?} policy)", policy);
        Ok(keys)
    }
}

impl KeySource for TerminalKeys {
    fn poll_key(&mut self) -> Result<Option<Key>> {
        let next_event = || {
            if event::poll(Duration::ZERO).map_err(Error::Terminal)? {
                event::read().map(Some).map_err(Error::Terminal)
            } else {
                Ok(None)
            }
        };
        self.reader.read_tick(next_event, Instant::now())
    }

    fn restore(&mut self) -> Result<()> {
        if !self.raw {
            return Ok(());
        }
        self.raw = false;

        let mut out = stdout();
        if self.enhanced {
            execute!(out, PopKeyboardEnhancementFlags).map_err(Error::Terminal)?;
        }
        execute!(out, Show).map_err(Error::Terminal)?;
        out.flush().map_err(Error::Terminal)?;
        disable_raw_mode().map_err(Error::Terminal)
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}
