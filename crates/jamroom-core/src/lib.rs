pub mod errors;
pub mod filter;
pub mod ids;
pub mod protocol;
pub mod session;

pub use errors::ValidationError;
pub use filter::GenreFilter;
pub use ids::{ConnectionId, PeerId, SessionId};
pub use session::{SessionDraft, SessionRecord, Visibility};
