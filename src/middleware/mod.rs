mod authorize;

pub use authorize::{AuthorizeState, DEFAULT_CONTEXT_HEADER, authorize_middleware};
