pub mod subscription;
pub mod payment;

pub use subscription::*;
pub use payment::*;
