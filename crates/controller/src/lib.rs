//! Keeps pfSense HAProxy backends and frontends in line with container labels.

pub mod api;
pub mod app;
pub mod config;
pub mod container;
pub mod controller;
pub mod haproxy;
pub mod labels;
pub mod metrics;
