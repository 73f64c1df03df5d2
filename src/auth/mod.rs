mod claims;
mod error;
mod principal;
mod refresh;
mod token;

pub use claims::{
    ClaimShape, ISSUER, OpenClaims, RESERVED_CLAIMS, RoleFormat, StandardClaims, TokenPrincipal,
    ValidatedClaims,
};
pub use error::{AuthError, ErrorInfo, ErrorResponse, RefreshTokenError, TokenError};
pub use principal::{TOKEN_COOKIE, bearer_token, extract_token};
pub use refresh::{IssuedRefreshToken, RefreshTokenService};
pub use token::{TokenCodec, TokenRequest};
