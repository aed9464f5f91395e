pub mod agent;
pub mod notification;
pub mod parcel;
pub mod user;
