//! Wire protocol shared by the task executor and the worker processes it spawns.
//!
//! A worker reads one [`TaskRequest`] line from stdin, then keeps reading
//! [`ControlMessage`] lines until it exits. Everything it reports travels back
//! on stdout as [`Event`] frames, one JSON object per line.

pub mod event;
pub mod protocol;
pub mod records;
pub mod task_state;

pub use event::Event;
pub use protocol::{ControlMessage, Parameters, ProtocolError, TaskRequest};
pub use records::Records;
pub use task_state::TaskState;
