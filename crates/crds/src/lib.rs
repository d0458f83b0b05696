//! WebService CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the WebService controller.

pub mod web_service;

pub use web_service::*;
