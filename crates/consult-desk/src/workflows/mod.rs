pub mod consultation;
pub mod notifications;
