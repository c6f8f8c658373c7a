// Life of a request:
// 1. Request comes in through the base router (clacks header, request log,
//    per-client rate limits, read/write timeouts)
// 2. Protected routes run an authenticator:
//     - Cookie: token from the `GatehouseAuth` cookie
//     - Bearer: token from the `Authorization` header
// 3. The signatory checks the signature and expiry
//     - Valid: claims land in the request's `ClaimStore`, handler runs
//     - Invalid: 401, or a redirect for cookie routes that configure one
// 4. Login handlers run inside a timebox, then drop a cookie or return a
//    bearer token signed over claims they collected
//
// System components:
//  - Signatory (secret lifecycle, sign, validate)
//  - Timebox (constant-latency gate)
//  - Delivery adapters (cookie, bearer)

pub mod bearer;
pub mod claims;
pub mod config;
pub mod cookie;
pub mod filter;
pub mod logging;
pub mod router;
pub mod signatory;
pub mod timebox;

mod e2e_tests;

pub use claims::{ClaimStore, ClaimValue};
pub use filter::{AuthOutcome, Authenticator, protect};
pub use signatory::{FallbackSecret, SignError, Signatory};
pub use timebox::{Deadline, timebox};
