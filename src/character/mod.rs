//! Mascot animation state machine
//!
//! Each [`CharacterState`] plays a fixed list of frames, either looping or
//! once. One-shot animations hand control to the next state when they
//! finish. [`Character`] holds no clock; the [`Animator`] threads drive it.

mod animator;

use std::collections::BTreeSet;
use std::path::Path;

use rand::Rng;

pub use animator::{Animator, BEHAVIOR_TICK, MascotView};

use crate::config::CharacterConfig;

/// Seconds in Normal without interaction before the mascot falls asleep
pub const SLEEP_AFTER_SECS: u32 = 60;

/// Chance per behavior tick of an ambient look-around
pub const LOOK_AROUND_CHANCE: f64 = 0.05;

/// Mascot states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterState {
    Sleeping,
    LookingAroundSleep,
    LookingAround,
    Normal,
    ClickMe,
    Winking,
}

impl CharacterState {
    pub const ALL: [Self; 6] = [
        Self::Sleeping,
        Self::LookingAroundSleep,
        Self::LookingAround,
        Self::Normal,
        Self::ClickMe,
        Self::Winking,
    ];
}

/// One image held for `duration_ms` (0 advances immediately)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationFrame {
    pub image: &'static str,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Animation {
    pub frames: &'static [AnimationFrame],
    pub is_loop: bool,
}

const fn frame(image: &'static str, duration_ms: u64) -> AnimationFrame {
    AnimationFrame { image, duration_ms }
}

const NORMAL: Animation = Animation {
    frames: &[
        frame("faces/smile.png", 2000),
        frame("faces/closed_eyes.png", 100),
        frame("faces/smile.png", 0),
    ],
    is_loop: true,
};

const SLEEPING: Animation = Animation {
    frames: &[
        frame("faces/sleep1.png", 1000),
        frame("faces/sleep2.png", 1000),
        frame("faces/sleep1.png", 0),
    ],
    is_loop: true,
};

const LOOKING_AROUND_SLEEP: Animation = Animation {
    frames: &[
        frame("faces/sleep_look_right2.png", 1000),
        frame("faces/sleep_look_right1.png", 250),
        frame("faces/sleep_look_front.png", 250),
        frame("faces/sleep_look_left1.png", 250),
        frame("faces/sleep_look_left2.png", 1000),
        frame("faces/sleep_look_left1.png", 250),
        frame("faces/sleep_look_front.png", 250),
        frame("faces/sleep_look_right1.png", 250),
        frame("faces/sleep_look_right2.png", 1000),
    ],
    is_loop: false,
};

const LOOKING_AROUND: Animation = Animation {
    frames: &[
        frame("faces/look_right1.png", 250),
        frame("faces/look_right2.png", 1000),
        frame("faces/look_right1.png", 250),
        frame("faces/smile.png", 250),
        frame("faces/look_left1.png", 250),
        frame("faces/look_left2.png", 1000),
        frame("faces/look_left1.png", 250),
        frame("faces/smile.png", 250),
        frame("faces/look_right1.png", 250),
        frame("faces/look_right2.png", 1000),
        frame("faces/look_right1.png", 250),
    ],
    is_loop: false,
};

const CLICK_ME: Animation = Animation {
    frames: &[
        frame("faces/here1.png", 400),
        frame("faces/here2.png", 400),
        frame("faces/here1.png", 0),
    ],
    is_loop: true,
};

const WINKING: Animation = Animation {
    frames: &[frame("faces/wink.png", 1000), frame("faces/smile.png", 1000)],
    is_loop: false,
};

/// Frame table for `state`
#[must_use]
pub const fn animation(state: CharacterState) -> &'static Animation {
    match state {
        CharacterState::Sleeping => &SLEEPING,
        CharacterState::LookingAroundSleep => &LOOKING_AROUND_SLEEP,
        CharacterState::LookingAround => &LOOKING_AROUND,
        CharacterState::Normal => &NORMAL,
        CharacterState::ClickMe => &CLICK_ME,
        CharacterState::Winking => &WINKING,
    }
}

/// Requests from the mascot to the hosting screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSignal {
    /// The wink finished; leave the mascot screen
    NavigateHome,
}

/// Mascot state, frame position and inactivity counter
#[derive(Debug, Clone)]
pub struct Character {
    state: CharacterState,
    frame: usize,
    awake: bool,
    inactivity_secs: u32,
    restart: bool,
    holding: bool,
    sleep_after_secs: u32,
    look_around_chance: f64,
}

impl Character {
    /// A sleeping mascot
    #[must_use]
    pub fn new(config: &CharacterConfig) -> Self {
        let chance = if config.look_around_chance.is_nan() {
            0.0
        } else {
            config.look_around_chance.clamp(0.0, 1.0)
        };

        Self {
            state: CharacterState::Sleeping,
            frame: 0,
            awake: false,
            inactivity_secs: 0,
            restart: false,
            holding: false,
            sleep_after_secs: config.sleep_after_secs,
            look_around_chance: chance,
        }
    }

    #[must_use]
    pub const fn state(&self) -> CharacterState {
        self.state
    }

    #[must_use]
    pub const fn is_awake(&self) -> bool {
        self.awake
    }

    #[must_use]
    pub const fn inactivity_secs(&self) -> u32 {
        self.inactivity_secs
    }

    #[must_use]
    pub const fn frame_index(&self) -> usize {
        self.frame
    }

    #[must_use]
    pub fn current_frame(&self) -> &'static AnimationFrame {
        let frames = animation(self.state).frames;
        &frames[self.frame.min(frames.len() - 1)]
    }

    /// Advance past the current frame
    ///
    /// Looping animations wrap. One-shot animations run their completion
    /// transition; the wink instead holds its last frame and asks the host
    /// to navigate away.
    pub fn finish_frame(&mut self) -> Option<CharacterSignal> {
        if self.holding {
            return None;
        }

        let animation = animation(self.state);
        self.frame += 1;
        if self.frame < animation.frames.len() {
            return None;
        }

        if animation.is_loop {
            self.frame = 0;
            return None;
        }

        match self.state {
            CharacterState::LookingAroundSleep => self.change_state(CharacterState::Sleeping),
            CharacterState::LookingAround => self.change_state(CharacterState::Normal),
            CharacterState::Winking => {
                self.frame = animation.frames.len() - 1;
                self.holding = true;
                tracing::debug!("wink finished");
                return Some(CharacterSignal::NavigateHome);
            }
            _ => self.frame = 0,
        }
        None
    }

    /// One ambient behavior step, run once per second
    pub fn behavior_tick<R: Rng>(&mut self, rng: &mut R) {
        match self.state {
            CharacterState::Normal => {
                if rng.gen_bool(self.look_around_chance) {
                    self.change_state(CharacterState::LookingAround);
                }

                self.inactivity_secs += 1;
                if self.inactivity_secs >= self.sleep_after_secs {
                    tracing::debug!(after = self.inactivity_secs, "mascot falling asleep");
                    self.change_state(CharacterState::Sleeping);
                    self.inactivity_secs = 0;
                    self.awake = false;
                }
            }
            CharacterState::Sleeping if !self.awake => {
                if rng.gen_bool(self.look_around_chance) {
                    self.change_state(CharacterState::LookingAroundSleep);
                }
            }
            _ => {}
        }
    }

    /// External wake trigger (presence or key press)
    pub fn wake_up(&mut self) {
        if self.awake {
            return;
        }
        self.awake = true;
        self.change_state(CharacterState::ClickMe);
        tracing::info!("mascot woke up");
    }

    /// Direct tap on the mascot
    pub fn tap(&mut self) {
        match self.state {
            CharacterState::Sleeping | CharacterState::LookingAroundSleep => self.wake_up(),
            CharacterState::ClickMe => {
                self.change_state(CharacterState::Normal);
                self.inactivity_secs = 0;
            }
            CharacterState::Normal => self.change_state(CharacterState::Winking),
            CharacterState::LookingAround | CharacterState::Winking => {}
        }
    }

    /// Whether a state change happened since the last call; clears the flag
    pub fn take_restart(&mut self) -> bool {
        std::mem::take(&mut self.restart)
    }

    #[must_use]
    pub const fn restart_pending(&self) -> bool {
        self.restart
    }

    fn change_state(&mut self, state: CharacterState) {
        tracing::debug!(from = ?self.state, to = ?state, "mascot state change");
        self.state = state;
        self.frame = 0;
        self.restart = true;
        self.holding = false;
    }
}

/// Result of [`check_assets`]
#[derive(Debug, Default)]
pub struct AssetReport {
    /// Distinct images referenced by the frame tables
    pub checked: usize,

    /// `(image, error)` for every image that failed to decode
    pub failures: Vec<(String, String)>,
}

impl AssetReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Decode every image referenced by the frame tables under `dir`
pub fn check_assets(dir: &Path) -> AssetReport {
    let images: BTreeSet<&'static str> = CharacterState::ALL
        .iter()
        .flat_map(|&state| animation(state).frames.iter().map(|f| f.image))
        .collect();

    let mut report = AssetReport {
        checked: images.len(),
        failures: Vec::new(),
    };

    for name in images {
        if let Err(e) = image::open(dir.join(name)) {
            tracing::warn!(image = name, error = %e, "animation frame unavailable");
            report.failures.push((name.to_string(), e.to_string()));
        }
    }

    report
}
