pub mod pool;
pub mod serve;
pub mod status;
