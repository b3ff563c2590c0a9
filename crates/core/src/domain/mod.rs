pub mod candidate;
pub mod preference;
pub mod price;
pub mod session;
