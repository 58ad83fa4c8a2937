//! HTTP ingress: routing, request mapping and service wiring.

pub mod app;
