// Fixed-tick control loop with guaranteed stop on exit
// Every exit path (Escape, Ctrl+C, SIGINT, input failure, panic) ends with a
// Stop byte followed by closing the link.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

// local imports
use crate::command::Command;
use crate::config::Config;
use crate::error::Result;
use crate::input::{KeySource, TerminalKeys};
use crate::link::{SerialLink, Transport};
use crate::translator::{Key, Policy, Translator};
use crate::upload::Uploader;

/// Why the control loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Escape,
    Interrupted,
}

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(ExitReason),
}

/// A teleoperation session: owns the link and the movement state
pub struct Session<T: Transport> {
    link: T,
    translator: Translator,
    tick: Duration,
}

impl<T: Transport> Session<T> {
    pub fn new(link: T, policy: Policy, tick: Duration) -> Self {
        Self {
            link,
            translator: Translator::new(policy),
            tick,
        }
    }

    pub fn link(&self) -> &T {
        &self.link
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Apply one tick of input.
    ///
    /// A failed write is logged and dropped. The movement state is not rolled
    /// back, so after a failure it may disagree with what the device is doing.
    pub fn step(&mut self, key: Option<Key>) -> Flow {
        let emission = self.translator.on_tick(key);

        for command in emission.commands() {
            match self.link.write_command(command) {
                Ok(()) if command.is_motion() => {
                    info!("Motion: {:?}", self.translator.state().active())
                }
                Ok(()) => info!("Speed adjust: {:?}", command),
                Err(e) => warn!("Command '{}' not delivered: {}", command, e),
            }
        }

        // Controller chatter is informational only
        while let Some(line) = self.link.read_line(Duration::ZERO) {
            debug!("Controller: {}", line);
        }

        if !emission.exit {
            Flow::Continue
        } else if key == Some(Key::Interrupt) {
            Flow::Exit(ExitReason::Interrupted)
        } else {
            Flow::Exit(ExitReason::Escape)
        }
    }

    /// Poll `keys` every tick until the session ends or SIGINT arrives,
    /// then shut down
    pub async fn run<K: KeySource>(&mut self, keys: &mut K) -> Result<ExitReason> {
        self.run_until(keys, signal::ctrl_c()).await
    }

    /// Like [`Session::run`], with `interrupt` standing in for SIGINT. If
    /// `interrupt` fails the loop keeps going without it.
    pub async fn run_until<K, I>(&mut self, keys: &mut K, interrupt: I) -> Result<ExitReason>
    where
        K: KeySource,
        I: Future<Output = std::io::Result<()>>,
    {
        let mut tick = interval(self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(interrupt);
        let mut signal_armed = true;

        info!(
            "Control loop started: {:?} policy, {}ms tick",
            self.translator.policy(),
            self.tick.as_millis()
        );

        let result = loop {
            tokio::select! {
                res = &mut interrupt, if signal_armed => match res {
                    Ok(()) => break Ok(ExitReason::Interrupted),
                    Err(e) => {
                        warn!("Cannot listen for Ctrl+C: {}", e);
                        signal_armed = false;
                    }
                },
                _ = tick.tick() => {
                    let key = match keys.poll_key() {
                        Ok(key) => key,
                        Err(e) => break Err(e),
                    };
                    if let Flow::Exit(reason) = self.step(key) {
                        break Ok(reason);
                    }
                }
            }
        };

        match &result {
            Ok(reason) => info!("Exiting: {:?}", reason),
            Err(e) => warn!("Control loop failed: {}", e),
        }
        self.shutdown();
        result
    }

    /// Send a final Stop and close the link. Only the first call does anything.
    pub fn shutdown(&mut self) {
        if !self.link.is_open() {
            return;
        }
        if let Err(e) = self.link.write_command(Command::Stop) {
            warn!("Failed to send final stop: {}", e);
        }
        self.link.close();
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Upload firmware, connect, and drive the motors from the keyboard
pub async fn run(config: &Config) -> Result<ExitReason> {
    config.validate()?;

    if config.skip_upload {
        info!("Skipping firmware upload");
    } else {
        Uploader::from_config(config).run().await?;
    }

    let link = SerialLink::open(&config.port, config.baud)?;
    sleep(config.settle()).await;
    let mut session = Session::new(link, config.policy, config.tick());

    info!("Controls: arrows=move, h=home, s/d=speed (hold policy), Esc=quit");
    let mut keys = TerminalKeys::acquire(config)?;
    let result = session.run(&mut keys).await;

    if let Err(e) = keys.restore() {
        warn!("Failed to restore terminal: {}", e);
    }
    result
}
