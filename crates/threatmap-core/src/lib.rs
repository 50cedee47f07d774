//! Threatmap Core Types and Definitions
//!
//! This crate provides the foundational types shared by every Threatmap
//! crate. It includes:
//!
//! - **Model**: The structured threat-model document ([`model::ThreatModel`])
//! - **Geometry**: Basic geometric types ([`geometry`] module)
//! - **Identifiers**: Ref generation, slugs and placeholder names ([`identifier`] module)

pub mod geometry;
pub mod identifier;
pub mod model;
