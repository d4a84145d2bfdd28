pub mod channels;
pub mod custom_types;
pub mod employees;
pub mod notifications;
pub mod organizations;
pub mod payments;
pub mod work_sessions;
