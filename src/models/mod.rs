mod capabilities;
mod refresh_token;
mod role;
mod rule;
mod token_gen;
mod validators;

pub use capabilities::*;
pub use refresh_token::*;
pub use role::*;
pub use rule::*;
pub use token_gen::*;
pub use validators::*;
