pub mod accounts;
pub mod assignment;
pub mod lifecycle;
