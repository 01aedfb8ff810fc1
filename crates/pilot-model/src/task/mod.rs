mod state;
pub use state::TaskState;

mod command;
pub use command::TaskCommand;

mod token;
pub use token::TokenId;

mod doc;
pub use doc::{TaskDoc, TaskResult};
