pub mod pakasir;

pub use pakasir::PakasirGateway;
