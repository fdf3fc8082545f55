//! nvmf-csi Protocol - CSI gRPC service definitions
//!
//! Generated code for the Identity and Controller services of the
//! Container Storage Interface, v1.

/// CSI v1 messages and services
pub mod csi {
    tonic::include_proto!("csi.v1");
}
