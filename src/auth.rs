//! Auth-domain identifiers, scope sets, claims, and the cached entity model.

pub mod account;
pub mod claims;
pub mod credential;
pub mod id;
pub mod scope;

pub use account::*;
pub use claims::*;
pub use credential::*;
pub use id::*;
pub use scope::*;
