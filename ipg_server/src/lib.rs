//! # Invoice payment gateway server
//! This crate hosts the HTTP server for the invoice payment gateway. It is responsible for:
//! * Creating PayPal orders for invoices and handing out their approval URLs.
//! * Capturing payments when buyers return from PayPal.
//! * Receiving PayPal webhooks, checking their signatures and applying them to the local records.
//! * Admin operations on the history: cancellation, refunds, reconciliation and bulk deletion.
//!
//! The same binary is also a command line tool for the admin operations. See [cli](cli/index.html).
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/orders/...`: Order creation, lookup, refresh and capture. Requires an access token.
//! * `/orders/{local_id}/return` and `/orders/{local_id}/cancelled`: PayPal's buyer landings.
//! * `/admin/...`: Cancellation, refunds and history management. Requires an admin access token.
//! * `/webhook/paypal`: PayPal event notifications.
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod middleware;
pub mod reconcile_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
