//! Readalong reading room server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod bus;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod invites;
pub mod moderation;
pub mod participants;
pub mod reward;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod ws;
