//! Application services: everything between the transport seam and a
//! front end.

pub mod engine;
pub mod input;
pub mod notify;
pub mod poller;
pub mod script;
pub mod storage;
pub mod streamer;

pub use engine::{EngineError, ExecutionEngine, Operation, SessionState};
pub use input::InputSession;
pub use notify::{ChangeTracker, LogNotifier, StateNotifier};
pub use poller::{PollerHandle, StatusPoller};
pub use script::{parse_program, ProgramUtils, ScriptError, ScriptRecorder};
pub use storage::{parse_listing_line, DeviceStorage, SdFileEntry, StorageError};
pub use streamer::{ChunkStreamer, StreamError};
