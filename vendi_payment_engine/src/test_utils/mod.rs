//! Support code for integration tests: throwaway databases, seed data and a scriptable gateway stub.

#[cfg(feature = "sqlite")]
pub mod prepare_env;
#[cfg(feature = "sqlite")]
pub mod seed;
pub mod stub_gateway;
