// State machine module for the task and process lifecycles.
//
// Statuses are deliberately small: tasks move NEW -> ASSIGNED -> DONE with
// no cancellation state, and processes are ACTIVE until their End node
// marks them COMPLETED. Transition legality lives here; persistence of the
// resulting status lives in the storage layer.

pub mod states;

pub use states::{ProcessStatus, TaskStatus};
