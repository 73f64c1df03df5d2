mod accounts;
mod refresh_tokens;
mod roles;
mod rules;

pub use accounts::*;
pub use refresh_tokens::*;
pub use roles::*;
pub use rules::*;
