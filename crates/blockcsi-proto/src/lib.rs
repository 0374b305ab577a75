//! blockcsi Protocol - CSI gRPC service definitions
//!
//! This crate contains the protobuf-generated code for the subset of the
//! Container Storage Interface v1 served by the controller plugin: the
//! Identity and Controller services.

/// CSI v1 messages and services
pub mod csi {
    #![allow(clippy::all, clippy::pedantic, clippy::nursery)]
    tonic::include_proto!("csi.v1");
}
