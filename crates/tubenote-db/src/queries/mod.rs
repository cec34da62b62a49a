mod notes;
mod tokens;
mod users;
mod videos;

pub use notes::{NoteChanges, NoteFilter};
pub use users::ProfileChanges;
