#![allow(non_snake_case)]

pub mod api;
pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod models;
pub mod orchestrator;
pub mod service;
pub mod session;
pub mod timezone;
