//! End-to-end tests at the HTTP request/response level.
//!
//! Each test file covers one protocol or endpoint, booting a real server and
//! checking the bytes a client would see.

#![cfg(test)]

mod helpers;

mod test_reset;
