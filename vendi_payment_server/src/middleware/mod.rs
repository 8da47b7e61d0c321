mod hmac;
mod machine_key;

pub use hmac::HmacMiddlewareFactory;
pub use machine_key::MachineKeyMiddlewareFactory;
