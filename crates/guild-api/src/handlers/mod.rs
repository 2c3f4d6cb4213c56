//! HTTP request handlers for the guild API

pub mod leaderboard;
pub mod service;
