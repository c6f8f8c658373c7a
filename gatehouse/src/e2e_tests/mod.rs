//! End-to-end tests at the HTTP request/response level.
//!
//! Each test file covers a specific scenario, driving a complete router
//! in-process with a fixed secret and short timeboxes.

#![cfg(test)]

mod helpers;

mod test_bearer_session;
mod test_cookie_session;
mod test_login_timebox;
mod test_router;
mod test_shared_fallback;
mod test_signatory_scenario;
