// Database rows and request/response models

pub mod admin;
pub mod cache;
pub mod chat;
pub mod profile;
pub mod program;
pub mod session;
pub mod subscription;

pub use admin::*;
pub use cache::*;
pub use chat::*;
pub use profile::*;
pub use program::*;
pub use session::*;
pub use subscription::*;
