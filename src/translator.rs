// Key-to-command state machine
//
// One key (or none) goes in per tick, at most one speed byte and at most one
// motion byte come out. Two policies are supported:
// - Toggle: each key press flips a persistent motion on or off
// - Hold: a motion lasts while its key is held, changes are edge-triggered

use serde::{Deserialize, Serialize};

use crate::command::Command;

/// Keys the translator understands, already decoded from the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Home,
    SpeedUp,
    SpeedDown,
    Escape,
    /// Ctrl+C read as a key while the terminal is in raw mode
    Interrupt,
    Other,
}

impl Key {
    fn direction(self) -> Option<Direction> {
        match self {
            Key::Up => Some(Direction::Up),
            Key::Down => Some(Direction::Down),
            Key::Left => Some(Direction::Left),
            Key::Right => Some(Direction::Right),
            _ => None,
        }
    }

    fn ends_session(self) -> bool {
        matches!(self, Key::Escape | Key::Interrupt)
    }
}

/// Input mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Each press flips the motion on or off
    #[default]
    Toggle,
    /// Motion lasts while the key is held
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn command(self) -> Command {
        match self {
            Direction::Up => Command::Up,
            Direction::Down => Command::Down,
            Direction::Left => Command::Left,
            Direction::Right => Command::Right,
        }
    }
}

/// What the motors were last told to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Active {
    #[default]
    Idle,
    Moving(Direction),
    Homing,
}

impl Active {
    fn command(self) -> Command {
        match self {
            Active::Idle => Command::Stop,
            Active::Moving(direction) => direction.command(),
            Active::Homing => Command::Home,
        }
    }
}

/// Movement flags for one session.
///
/// Only one of Up, Down, Left, Right and Home can be set at a time: the
/// state is a single tag rather than a set of booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MovementState {
    active: Active,
}

impl MovementState {
    pub fn active(&self) -> Active {
        self.active
    }

    pub fn is_moving(&self, direction: Direction) -> bool {
        self.active == Active::Moving(direction)
    }

    pub fn is_homing(&self) -> bool {
        self.active == Active::Homing
    }

    pub fn is_idle(&self) -> bool {
        self.active == Active::Idle
    }

    /// Flags in [Up, Down, Left, Right, Home] order
    pub fn flags(&self) -> [bool; 5] {
        [
            self.is_moving(Direction::Up),
            self.is_moving(Direction::Down),
            self.is_moving(Direction::Left),
            self.is_moving(Direction::Right),
            self.is_homing(),
        ]
    }

    fn clear(&mut self) {
        self.active = Active::Idle;
    }

    /// Flip `target`: activating it replaces whatever was active, toggling
    /// the active motion off yields Stop.
    fn toggle(&mut self, target: Active) -> Command {
        if self.active == target {
            self.active = Active::Idle;
            Command::Stop
        } else {
            self.active = target;
            target.command()
        }
    }
}

/// Output of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Emission {
    /// One-shot speed adjustment, written before the motion byte
    pub speed: Option<Command>,
    pub motion: Option<Command>,
    /// The session should end after this tick
    pub exit: bool,
}

impl Emission {
    fn motion(command: Command) -> Self {
        Self {
            motion: Some(command),
            ..Self::default()
        }
    }

    fn exit() -> Self {
        Self {
            exit: true,
            ..Self::default()
        }
    }

    /// Bytes to write for this tick, in order
    pub fn commands(&self) -> impl Iterator<Item = Command> + '_ {
        self.speed.iter().chain(self.motion.iter()).copied()
    }
}

/// Turns polled keys into commands according to a [`Policy`]
#[derive(Debug, Clone)]
pub struct Translator {
    policy: Policy,
    state: MovementState,
    // Hold policy: speed keys seen on the previous tick
    speed_up_held: bool,
    speed_down_held: bool,
}

impl Translator {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            state: MovementState::default(),
            speed_up_held: false,
            speed_down_held: false,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    /// Process the key polled this tick (`None` when idle)
    pub fn on_tick(&mut self, key: Option<Key>) -> Emission {
        match self.policy {
            Policy::Toggle => self.toggle_tick(key),
            Policy::Hold => self.hold_tick(key),
        }
    }

    fn toggle_tick(&mut self, key: Option<Key>) -> Emission {
        let Some(key) = key else {
            return Emission::default();
        };

        if key.ends_session() {
            self.state.clear();
            return Emission {
                motion: Some(Command::Stop),
                exit: true,
                ..Emission::default()
            };
        }

        let target = match key {
            Key::Home => Active::Homing,
            other => match other.direction() {
                Some(direction) => Active::Moving(direction),
                None => return Emission::default(),
            },
        };

        Emission::motion(self.state.toggle(target))
    }

    fn hold_tick(&mut self, key: Option<Key>) -> Emission {
        if key.is_some_and(Key::ends_session) {
            // Stop is written at teardown
            return Emission::exit();
        }

        let speed_up = key == Some(Key::SpeedUp);
        let speed_down = key == Some(Key::SpeedDown);

        let mut emission = Emission::default();
        if speed_up && !self.speed_up_held {
            emission.speed = Some(Command::SpeedUp);
        }
        if speed_down && !self.speed_down_held {
            emission.speed = Some(Command::SpeedDown);
        }
        self.speed_up_held = speed_up;
        self.speed_down_held = speed_down;

        let wanted = match key.and_then(Key::direction) {
            Some(direction) => Active::Moving(direction),
            None => Active::Idle,
        };
        if wanted != self.state.active {
            self.state.active = wanted;
            emission.motion = Some(wanted.command());
        }

        emission
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(translator: &mut Translator, keys: &[Option<Key>]) -> Vec<u8> {
        keys.iter()
            .flat_map(|&key| translator.on_tick(key).commands().collect::<Vec<_>>())
            .map(Command::as_byte)
            .collect()
    }

    fn set_count(state: MovementState) -> usize {
        state.flags().iter().filter(|&&f| f).count()
    }

    #[test]
    fn test_toggle_same_key_twice() {
        let mut t = Translator::new(Policy::Toggle);
        let sent = feed(&mut t, &[Some(Key::Up), Some(Key::Up)]);
        assert_eq!(sent, b"US");
        assert!(t.state().is_idle());
    }

    #[test]
    fn test_toggle_left_then_right() {
        let mut t = Translator::new(Policy::Toggle);
        let sent = feed(&mut t, &[Some(Key::Left), Some(Key::Right)]);
        assert_eq!(sent, b"LR");
        assert!(!t.state().is_moving(Direction::Left));
        assert!(t.state().is_moving(Direction::Right));
    }

    #[test]
    fn test_toggle_home_replaces_direction() {
        let mut t = Translator::new(Policy::Toggle);
        let sent = feed(&mut t, &[Some(Key::Up), Some(Key::Home)]);
        assert_eq!(sent, b"UH");
        assert!(t.state().is_homing());
        assert!(!t.state().is_moving(Direction::Up));

        // Home toggles off like a direction
        assert_eq!(feed(&mut t, &[Some(Key::Home)]), b"S");
    }

    #[test]
    fn test_toggle_direction_clears_home() {
        let mut t = Translator::new(Policy::Toggle);
        let sent = feed(&mut t, &[Some(Key::Home), Some(Key::Down)]);
        assert_eq!(sent, b"HD");
        assert_eq!(t.state().active(), Active::Moving(Direction::Down));
    }

    #[test]
    fn test_toggle_at_most_one_flag() {
        let keys = [
            Key::Up,
            Key::Left,
            Key::Home,
            Key::Down,
            Key::Down,
            Key::Right,
            Key::Up,
            Key::Home,
            Key::Home,
            Key::Left,
            Key::SpeedUp,
            Key::Other,
        ];
        let mut t = Translator::new(Policy::Toggle);
        for key in keys {
            let emission = t.on_tick(Some(key));
            assert!(set_count(t.state()) <= 1, "after {:?}: {:?}", key, t.state());
            assert!(emission.speed.is_none());
        }
    }

    #[test]
    fn test_toggle_ignores_idle_and_unmapped_keys() {
        let mut t = Translator::new(Policy::Toggle);
        let sent = feed(
            &mut t,
            &[None, Some(Key::Right), None, Some(Key::SpeedDown), Some(Key::Other)],
        );
        assert_eq!(sent, b"R");
        assert!(t.state().is_moving(Direction::Right));
    }

    #[test]
    fn test_toggle_escape_stops_and_exits() {
        let mut t = Translator::new(Policy::Toggle);
        t.on_tick(Some(Key::Left));
        let emission = t.on_tick(Some(Key::Escape));
        assert!(emission.exit);
        assert_eq!(emission.motion, Some(Command::Stop));
        assert!(t.state().is_idle());
    }

    #[test]
    fn test_hold_same_key_writes_once() {
        let mut t = Translator::new(Policy::Hold);
        let sent = feed(&mut t, &[Some(Key::Up); 25]);
        assert_eq!(sent, b"U");
    }

    #[test]
    fn test_hold_release_emits_one_stop() {
        let mut t = Translator::new(Policy::Hold);
        let sent = feed(
            &mut t,
            &[Some(Key::Left), Some(Key::Left), None, None, None],
        );
        assert_eq!(sent, b"LS");
        assert!(t.state().is_idle());
    }

    #[test]
    fn test_hold_switch_direction() {
        let mut t = Translator::new(Policy::Hold);
        let sent = feed(&mut t, &[Some(Key::Up), Some(Key::Right), Some(Key::Right)]);
        assert_eq!(sent, b"UR");
    }

    #[test]
    fn test_hold_idle_start_writes_nothing() {
        let mut t = Translator::new(Policy::Hold);
        assert!(feed(&mut t, &[None, None, Some(Key::Other)]).is_empty());
    }

    #[test]
    fn test_hold_speed_keys_are_edge_triggered() {
        let mut t = Translator::new(Policy::Hold);
        let sent = feed(
            &mut t,
            &[
                Some(Key::SpeedUp),
                Some(Key::SpeedUp),
                None,
                Some(Key::SpeedUp),
                Some(Key::SpeedDown),
                Some(Key::SpeedDown),
            ],
        );
        assert_eq!(sent, b"FFW");
    }

    #[test]
    fn test_hold_speed_key_releases_motion() {
        // A speed key is not a directional key, so the held motion ends
        let mut t = Translator::new(Policy::Hold);
        let sent = feed(&mut t, &[Some(Key::Down), Some(Key::SpeedDown)]);
        assert_eq!(sent, b"DWS");

        let emission = Translator::new(Policy::Hold).on_tick(Some(Key::SpeedUp));
        assert_eq!(emission.speed, Some(Command::SpeedUp));
        assert_eq!(emission.motion, None);
    }

    #[test]
    fn test_hold_escape_exits_without_write() {
        let mut t = Translator::new(Policy::Hold);
        t.on_tick(Some(Key::Up));
        let emission = t.on_tick(Some(Key::Escape));
        assert!(emission.exit);
        assert_eq!(emission.commands().count(), 0);
    }

    #[test]
    fn test_hold_home_key_is_not_a_motion() {
        let mut t = Translator::new(Policy::Hold);
        assert!(feed(&mut t, &[Some(Key::Home)]).is_empty());
    }

    #[test]
    fn test_policy_names() {
        let policy: Policy = serde_json::from_str("\"hold\"").unwrap();
        assert_eq!(policy, Policy::Hold);
        assert_eq!(serde_json::to_string(&Policy::Toggle).unwrap(), "\"toggle\"");
    }
}
