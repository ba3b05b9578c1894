//! Headless client for a cloud music catalog resolver and downloader service.
//!
//! The resolver service proxies a third-party music catalog: it resolves
//! song, playlist and album links to metadata and download URLs, issues
//! login QR codes and serves audio files. This crate implements the pieces
//! of that workflow with real state and timing behavior:
//!
//! * [`login`]: the QR login state machine and its timer driver
//! * [`resolve`]: link/ID extraction and last-write-wins result dispatch
//! * [`page`]: paginated views over a resolved collection
//! * [`download`]: single and batch downloads with synthetic progress
//! * [`gate`]: the per-action session/entitlement gate
//!
//! [`client`] and [`protocol`] cover the service's wire contract.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod gate;
pub mod http;
pub mod login;
pub mod page;
pub mod protocol;
pub mod resolve;
pub mod session;
pub mod track;
