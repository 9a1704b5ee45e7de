//! # Audio Module
//!
//! Per-guild playback core for the bot.
//!
//! The system is built around four pieces:
//!
//! ### [`queue`] - Sound queue
//! - FIFO queue with async pop-when-empty for the playback loop
//! - Shuffle, removal and pagination for the command surface
//!
//! ### [`session`] - Voice session
//! - One session per guild, owning the queue and a single playback loop task
//! - Skip votes, loop/volume flags, 180s idle-timeout teardown
//!
//! ### [`registry`] - Session registry
//! - Guild → session map; creates on first use, replaces timed-out sessions
//!
//! ### [`voice`] - Voice connection seam
//! - `VoiceConnection` trait over songbird so the session core is testable
//!   without Discord, plus the track-end signal and the now-playing notifier

pub mod queue;
pub mod registry;
pub mod session;
pub mod track;
pub mod voice;
