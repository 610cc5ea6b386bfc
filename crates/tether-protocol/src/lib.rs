pub mod document;
pub mod request;
pub mod token;
pub mod topics;

pub use document::*;
pub use request::*;
pub use token::*;
