pub mod agent;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod grpc;
pub mod shutdown;
pub mod targets;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("jarvis");
}
