pub mod executor;
pub mod results;
pub mod session;

pub use results::{Fetch, QueryRow};
pub use session::{QuerySession, SessionState};
