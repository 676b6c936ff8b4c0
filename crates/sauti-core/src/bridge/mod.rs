//! Engines hosted in a Python daemon process
//!
//! The models are Python packages (`indextts` for synthesis, `whisper` for
//! recognition). Loading one means spawning a daemon that imports and loads
//! the model once; each call is then a request over the daemon's socket.

mod daemon;
mod indextts;
mod whisper;

pub use daemon::{DaemonResponse, PythonDaemon};
pub use indextts::{IndexTtsEngine, IndexTtsLoader};
pub use whisper::{WhisperEngine, WhisperLoader};
