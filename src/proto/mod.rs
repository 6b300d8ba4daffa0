//! Generated protobuf bindings for the Envoy v2 secret discovery API.
//!
//! The module tree mirrors the protobuf package hierarchy so that the
//! relative paths emitted by the code generator resolve.

#![allow(
    missing_docs,
    missing_debug_implementations,
    clippy::all,
    clippy::pedantic,
    unreachable_pub
)]

/// `envoy.*` packages.
pub mod envoy {
    /// `envoy.api.*` packages.
    pub mod api {
        /// `envoy.api.v2`: discovery request/response messages.
        pub mod v2 {
            tonic::include_proto!("envoy.api.v2");

            /// `envoy.api.v2.auth`: secret resources.
            pub mod auth {
                tonic::include_proto!("envoy.api.v2.auth");
            }

            /// `envoy.api.v2.core`: shared core types.
            pub mod core {
                tonic::include_proto!("envoy.api.v2.core");
            }
        }
    }

    /// `envoy.service.*` packages.
    pub mod service {
        /// `envoy.service.discovery.*` packages.
        pub mod discovery {
            /// `envoy.service.discovery.v2`: the secret discovery service.
            pub mod v2 {
                tonic::include_proto!("envoy.service.discovery.v2");
            }
        }
    }
}

/// `google.*` packages.
pub mod google {
    /// `google.rpc`: rich error model.
    pub mod rpc {
        tonic::include_proto!("google.rpc");
    }
}
