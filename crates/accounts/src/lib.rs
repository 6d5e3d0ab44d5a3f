//! User accounts: registration, login and JWT issuance.

pub mod password;
pub mod token;
pub mod users;

pub use token::{Claims, decode_jwt, encode_jwt};
pub use users::{LoginSession, RegisterParams, UserProfile, UserService};
