mod state;
pub use state::{JobState, RemoteStatus};

mod doc;
pub use doc::JobDoc;
