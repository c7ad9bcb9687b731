//! The HTTP service around the study deck pipeline: adapters for the ports,
//! configuration, and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
