pub mod messages;
pub mod presence;
pub mod rooms;

pub use presence::PresenceBroadcaster;
pub use rooms::Rooms;
